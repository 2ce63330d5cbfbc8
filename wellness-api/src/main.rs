//! Wellness API Server Entry Point
//!
//! Connects to the system of record, cache, search index and broker (with
//! retries), starts the event publisher and the reconciliation consumers,
//! then serves the REST API until SIGINT or SIGTERM.

use std::sync::Arc;

use axum::Router;
use wellness_api::bootstrap::retry_startup;
use wellness_api::telemetry::init_tracing;
use wellness_api::{create_api_router, ApiConfig, ApiError, ApiResult, AppState, HealthReporter};
use wellness_core::{SyncConfig, WellnessError};
use wellness_events::{BrokerConfig, EventBroker, EventPublisher, PublisherConfig, RedisStreamBroker};
use wellness_storage::{
    CacheStore, ClientRepository, DbConfig, ElasticsearchIndex, PgClientRepository, RedisCache,
    RedisConfig, SearchConfig, SearchIndex,
};
use wellness_sync::{ConsumerGroup, ReconciliationHandlers};

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing()?;

    let api_config = ApiConfig::from_env();
    let sync_config = SyncConfig::from_env().map_err(WellnessError::from)?;
    sync_config.validate().map_err(WellnessError::from)?;

    let attempts = api_config.startup_retries;
    let delay = api_config.startup_retry_delay;

    // System of record
    let pool = DbConfig::from_env().create_pool()?;
    let pg = PgClientRepository::new(pool);
    retry_startup("system_of_record", attempts, delay, || pg.ensure_schema()).await?;
    let repository: Arc<dyn ClientRepository> = Arc::new(pg);

    // Cache
    let redis_config = RedisConfig::from_env();
    let cache: Arc<dyn CacheStore> = Arc::new(RedisCache::new(
        redis_config.create_pool()?,
        redis_config.timeout,
    ));
    retry_startup("cache", attempts, delay, || cache.ping()).await?;

    // Search index
    let search: Arc<dyn SearchIndex> = Arc::new(ElasticsearchIndex::new(&SearchConfig::from_env())?);
    retry_startup("search_index", attempts, delay, || search.ping()).await?;

    // Broker
    let broker: Arc<dyn EventBroker> = Arc::new(RedisStreamBroker::new(
        BrokerConfig::from_env().create_pool()?,
        sync_config.topic.clone(),
        sync_config.partitions,
    ));
    retry_startup("broker", attempts, delay, || broker.ping()).await?;

    let (publisher, publisher_handle) =
        EventPublisher::start(Arc::clone(&broker), PublisherConfig::from(&sync_config));

    let consumers = if sync_config.consumer_enabled {
        let handlers = ReconciliationHandlers::new(
            Arc::clone(&repository),
            Arc::clone(&cache),
            Arc::clone(&search),
        );
        Some(ConsumerGroup::new(Arc::clone(&broker), handlers, sync_config.clone()).start()?)
    } else {
        tracing::info!("Consumer group disabled");
        None
    };

    let health = HealthReporter::new(
        Arc::clone(&repository),
        Arc::clone(&cache),
        Arc::clone(&search),
        Arc::clone(&broker),
        publisher.metrics(),
        api_config.health_timeout,
    );
    let state = AppState {
        repository,
        search,
        publisher,
        health: Arc::new(health),
    };
    let app: Router = create_api_router(state);

    let addr = api_config.socket_addr()?;
    tracing::info!(%addr, "Starting wellness API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    if let Some(consumers) = consumers {
        consumers.stop().await;
    }
    publisher_handle.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
