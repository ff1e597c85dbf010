//! Throttle-aware retry of remote calls
//!
//! Each attempt first takes a permit from the category's limiter. A
//! [`RemoteError::TooManyRequests`](tenantsync_core::ports::RemoteError)
//! result shrinks the limiter, sleeps for the server-suggested delay, and
//! retries up to the policy's limit. Any other result is returned as is.

use std::future::Future;
use std::time::Duration;

use tenantsync_core::ports::throttled_for;
use tracing::{info, warn};

use crate::rate_limit::Limiter;
use crate::GraphError;

/// Default number of retries after a throttle response
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Longest delay honored from a throttle response
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

/// Retry limits for throttled calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            max_retry_after: MAX_RETRY_AFTER,
        }
    }
}

/// Runs `call` under `limiter`, retrying throttle responses.
///
/// When the retries run out the last error is returned with a
/// [`GraphError::RetriesExhausted`] context.
pub async fn with_retry<T, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    limiter: Option<&Limiter>,
    mut call: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 0;

    loop {
        if let Some(limiter) = limiter {
            limiter.acquire().await;
        }

        let err = match call().await {
            Ok(value) => {
                if let Some(limiter) = limiter {
                    limiter.on_success();
                }
                if attempt > 0 {
                    info!(operation, attempt, "Call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        let Some(retry_after) = throttled_for(&err) else {
            return Err(err);
        };

        if let Some(limiter) = limiter {
            limiter.on_throttle();
        }

        if attempt >= policy.max_retries {
            warn!(operation, attempts = attempt + 1, "Throttle retry limit exhausted");
            return Err(err.context(GraphError::RetriesExhausted {
                operation: operation.to_string(),
                attempts: attempt + 1,
            }));
        }

        let wait = retry_after.min(policy.max_retry_after);
        info!(
            operation,
            attempt,
            retry_after_ms = wait.as_millis() as u64,
            "Throttled, backing off"
        );
        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}
