//! Startup connection retries

use std::future::Future;
use std::time::Duration;
use wellness_core::WellnessResult;

/// Run `connect` until it succeeds or `attempts` are used up, sleeping
/// `delay` between attempts. Returns the last error.
pub async fn retry_startup<T, F, Fut>(
    service: &str,
    attempts: u32,
    delay: Duration,
    mut connect: F,
) -> WellnessResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = WellnessResult<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match connect().await {
            Ok(value) => {
                tracing::info!(service, attempt, "Connected");
                return Ok(value);
            }
            Err(e) if attempt < attempts => {
                tracing::warn!(
                    service,
                    attempt,
                    attempts,
                    error = %e,
                    "Connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(service, attempts, error = %e, "Giving up on connection");
                return Err(e);
            }
        }
    }
}
