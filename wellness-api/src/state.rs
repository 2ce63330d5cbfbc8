//! Shared application state for Axum routers.

use std::sync::Arc;
use wellness_events::EventPublisher;
use wellness_storage::{ClientRepository, SearchIndex};

use crate::routes::health::HealthReporter;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// System of record; every read and write of the API goes here.
    pub repository: Arc<dyn ClientRepository>,
    /// Search index, read by the search endpoint only.
    pub search: Arc<dyn SearchIndex>,
    /// Outbound event queue. Publishing never blocks a request.
    pub publisher: EventPublisher,
    pub health: Arc<HealthReporter>,
}
