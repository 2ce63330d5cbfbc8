//! Health Check Endpoint
//!
//! `GET /api/v1/health` probes the system of record, the cache, the search
//! index and the broker, each under its own timeout. The response is 200
//! only when every component is healthy and 503 otherwise.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wellness_core::{
    HealthCheck, HealthReport, WellnessResult, COMPONENT_BROKER, COMPONENT_CACHE,
    COMPONENT_SEARCH_INDEX, COMPONENT_SYSTEM_OF_RECORD,
};
use wellness_events::{EventBroker, PublisherMetrics};
use wellness_storage::{CacheStore, ClientRepository, SearchIndex};

use crate::state::AppState;

// ============================================================================
// REPORTER
// ============================================================================

/// Probes every backing service.
#[derive(Clone)]
pub struct HealthReporter {
    repository: Arc<dyn ClientRepository>,
    cache: Arc<dyn CacheStore>,
    search: Arc<dyn SearchIndex>,
    broker: Arc<dyn EventBroker>,
    publisher_metrics: Arc<PublisherMetrics>,
    timeout: Duration,
}

impl HealthReporter {
    pub fn new(
        repository: Arc<dyn ClientRepository>,
        cache: Arc<dyn CacheStore>,
        search: Arc<dyn SearchIndex>,
        broker: Arc<dyn EventBroker>,
        publisher_metrics: Arc<PublisherMetrics>,
        timeout: Duration,
    ) -> Self {
        Self {
            repository,
            cache,
            search,
            broker,
            publisher_metrics,
            timeout,
        }
    }

    /// Run all probes concurrently.
    pub async fn check(&self) -> HealthReport {
        let (system_of_record, cache, search, broker) = tokio::join!(
            probe(COMPONENT_SYSTEM_OF_RECORD, self.timeout, self.repository.ping()),
            probe(COMPONENT_CACHE, self.timeout, self.cache.ping()),
            probe(COMPONENT_SEARCH_INDEX, self.timeout, self.search.ping()),
            probe(COMPONENT_BROKER, self.timeout, self.broker.ping()),
        );

        let published = self.publisher_metrics.snapshot();
        let broker = broker
            .with_metadata("events_sent", published.sent.into())
            .with_metadata(
                "events_dropped",
                (published.dropped_queue_full + published.dropped_send_failed).into(),
            );

        HealthReport::from_checks(vec![system_of_record, cache, search, broker], Utc::now())
    }
}

async fn probe<F>(component: &str, timeout: Duration, ping: F) -> HealthCheck
where
    F: Future<Output = WellnessResult<()>>,
{
    let start = Instant::now();
    match tokio::time::timeout(timeout, ping).await {
        Ok(Ok(())) => HealthCheck::healthy(component)
            .with_response_time(start.elapsed().as_millis() as i64),
        Ok(Err(e)) => {
            tracing::warn!(component, error = %e, "Health probe failed");
            HealthCheck::unhealthy(component, e.to_string())
        }
        Err(_) => {
            tracing::warn!(component, timeout_ms = timeout.as_millis() as u64, "Health probe timed out");
            HealthCheck::unhealthy(
                component,
                format!("no response within {}ms", timeout.as_millis()),
            )
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/v1/health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.health.check().await;
    let status_code = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(report))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wellness_core::HealthStatus;
    use wellness_events::InMemoryBroker;
    use wellness_storage::{InMemoryCache, InMemoryClientRepository, InMemorySearchIndex};
    use wellness_test_utils::faults::{FailingCache, FlakyCache};

    fn reporter(cache: Arc<dyn CacheStore>) -> HealthReporter {
        HealthReporter::new(
            Arc::new(InMemoryClientRepository::new()),
            cache,
            Arc::new(InMemorySearchIndex::new()),
            Arc::new(InMemoryBroker::new("client_events", 1)),
            Arc::new(PublisherMetrics::new()),
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn test_all_components_healthy() {
        let report = reporter(Arc::new(InMemoryCache::new())).check().await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.checks.len(), 4);
    }

    #[tokio::test]
    async fn test_cache_outage_degrades() {
        let report = reporter(Arc::new(FailingCache::new())).check().await;
        assert_eq!(report.status, HealthStatus::Degraded);
        let cache = report
            .checks
            .iter()
            .find(|c| c.component == COMPONENT_CACHE)
            .expect("cache check should be reported");
        assert_eq!(cache.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_transient_cache_failure_recovers() {
        let reporter = reporter(Arc::new(FlakyCache::new(InMemoryCache::new(), 1)));

        let first = reporter.check().await;
        assert_eq!(first.status, HealthStatus::Degraded);

        let second = reporter.check().await;
        assert_eq!(second.status, HealthStatus::Healthy);
    }
}
