//! Client REST API Routes
//!
//! Every mutation writes the system of record first, then hands the
//! resulting snapshot to the event publisher and responds without waiting
//! for the cache or the search index to catch up.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use wellness_core::{ClientEventKind, ClientId, NewClient};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /api/v1/clients - Create a client
pub async fn create_client(
    State(state): State<AppState>,
    Json(req): Json<NewClient>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let client = state.repository.create(&req).await?;
    state.publisher.publish(ClientEventKind::Created, &client);

    tracing::info!(client_id = client.id, "Client created");
    Ok((StatusCode::CREATED, Json(client)))
}

/// GET /api/v1/clients/{id} - Get a client from the system of record
pub async fn get_client(
    State(state): State<AppState>,
    Path(id): Path<ClientId>,
) -> ApiResult<impl IntoResponse> {
    let client = state
        .repository
        .get(id)
        .await?
        .ok_or_else(|| ApiError::client_not_found(id))?;

    Ok(Json(client))
}

/// PUT /api/v1/clients/{id} - Replace a client's fields
pub async fn update_client(
    State(state): State<AppState>,
    Path(id): Path<ClientId>,
    Json(req): Json<NewClient>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let mut client = state
        .repository
        .get(id)
        .await?
        .ok_or_else(|| ApiError::client_not_found(id))?;
    client.apply(&req, Utc::now());

    let client = state.repository.update(&client).await?;
    state.publisher.publish(ClientEventKind::Updated, &client);

    tracing::info!(client_id = client.id, "Client updated");
    Ok(Json(client))
}

/// DELETE /api/v1/clients/{id} - Delete a client
pub async fn delete_client(
    State(state): State<AppState>,
    Path(id): Path<ClientId>,
) -> ApiResult<StatusCode> {
    let client = state.repository.delete(id).await?;
    state.publisher.publish(ClientEventKind::Deleted, &client);

    tracing::info!(client_id = id, "Client deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/clients/search?q= - Free-text search over the index
pub async fn search_clients(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<impl IntoResponse> {
    let query = params.q.trim();
    if query.is_empty() {
        return Err(ApiError::missing_field("q"));
    }

    let hits = state.search.search(query).await?;
    Ok(Json(hits))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::post(create_client))
        .route("/search", get(search_clients))
        .route(
            "/:id",
            get(get_client).put(update_client).delete(delete_client),
        )
}
