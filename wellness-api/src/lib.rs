//! Wellness API - REST surface and process wiring
//!
//! Routes:
//! - `POST   /api/v1/clients`
//! - `GET    /api/v1/clients/{id}`
//! - `PUT    /api/v1/clients/{id}`
//! - `DELETE /api/v1/clients/{id}`
//! - `GET    /api/v1/clients/search?q=`
//! - `GET    /api/v1/health`

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::health::HealthReporter;
pub use state::AppState;

use axum::http::{header, Method};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the full API router.
pub fn create_api_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_origin(Any);

    Router::new()
        .nest("/api/v1/clients", routes::clients::create_router())
        .nest("/api/v1/health", routes::health::create_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
