use fleet_core::{FleetError, FleetResult};
use std::future::Future;
use tracing::{info, warn};

pub use fleet_core::RetryPolicy;

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempt budget is spent.
///
/// `op` receives the 1-based attempt number. Between attempts the wrapper
/// sleeps `backoff_base * 2^(attempt-1)` (capped). When the budget runs out
/// the last error is returned wrapped in [`FleetError::RetriesExhausted`];
/// non-transient errors are returned unchanged on first sight.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> FleetResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = FleetResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !err.is_transient() {
            warn!(operation, attempt, error = %err, "Non-retryable error");
            return Err(err);
        }

        if attempt >= max_attempts {
            warn!(operation, attempts = attempt, error = %err, "Retry budget exhausted");
            return Err(FleetError::RetriesExhausted {
                attempts: attempt,
                source: Box::new(err),
            });
        }

        let delay = policy.backoff_for(attempt);
        info!(
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retryable error, backing off"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
