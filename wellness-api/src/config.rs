//! API Configuration Module
//!
//! Bind address and startup behaviour of the server process. Loaded from
//! environment variables with development defaults.

use crate::error::{ApiError, ApiResult};
use std::net::SocketAddr;
use std::time::Duration;
use wellness_core::{DEFAULT_STARTUP_RETRIES, DEFAULT_STARTUP_RETRY_DELAY_SECS, HEALTH_CHECK_TIMEOUT_MS};

/// Server process configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host or IP to bind.
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
    /// Connection attempts per backing service at startup.
    pub startup_retries: u32,
    /// Pause between startup attempts.
    pub startup_retry_delay: Duration,
    /// Timeout of each readiness probe.
    pub health_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            startup_retries: DEFAULT_STARTUP_RETRIES,
            startup_retry_delay: Duration::from_secs(DEFAULT_STARTUP_RETRY_DELAY_SECS),
            health_timeout: Duration::from_millis(HEALTH_CHECK_TIMEOUT_MS),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `WELLNESS_API_BIND`: Host to bind (default: 0.0.0.0)
    /// - `PORT` or `WELLNESS_API_PORT`: Port (default: 8080)
    /// - `WELLNESS_STARTUP_RETRIES`: Attempts per backing service (default: 5)
    /// - `WELLNESS_STARTUP_RETRY_DELAY_SECS`: Pause between attempts (default: 3)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .or_else(|| std::env::var("WELLNESS_API_PORT").ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.port);

        Self {
            bind: std::env::var("WELLNESS_API_BIND").unwrap_or(defaults.bind),
            port,
            startup_retries: std::env::var("WELLNESS_STARTUP_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.startup_retries),
            startup_retry_delay: std::env::var("WELLNESS_STARTUP_RETRY_DELAY_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.startup_retry_delay),
            health_timeout: defaults.health_timeout,
        }
    }

    /// Resolve the socket address to listen on.
    pub fn socket_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind, self.port);
        addr.parse::<SocketAddr>().map_err(|e| {
            ApiError::internal_error(format!("Invalid bind address {}: {}", addr, e))
        })
    }
}
