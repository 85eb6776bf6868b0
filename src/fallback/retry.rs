use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::error::{AgentError, Result};

/// Delay before retry number `attempt + 1`: `base * 2^(attempt - 1)`
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.saturating_mul(2u32.saturating_pow(exponent))
}

/// Race `fut` against a timer.
///
/// The work is spawned, so on deadline the caller stops waiting while the task
/// runs on detached and its outcome is dropped.
pub async fn with_timeout<T, Fut>(
    fut: Fut,
    duration: Duration,
    message: impl Into<String>,
) -> Result<T>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let handle = tokio::spawn(fut);
    match tokio::time::timeout(duration, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(AgentError::Unknown(format!("task failed: {}", join_err))),
        Err(_) => Err(AgentError::Timeout(message.into())),
    }
}

/// Run `op` up to `max_attempts` times with exponential backoff; the last
/// error is returned when every attempt fails
pub async fn retry_operation<T, F, Fut>(
    mut op: F,
    max_attempts: u32,
    base_delay: Duration,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => return Err(e),
            Err(e) => {
                let delay = backoff_delay(base_delay, attempt);
                debug!(
                    "Attempt {}/{} failed: {}; retrying in {:?}",
                    attempt, max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
