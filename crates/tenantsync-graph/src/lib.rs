//! TenantSync Graph - Remote call throttling
//!
//! Provides:
//! - Per-category rate limiting (token bucket or adaptive sliding window)
//! - Throttle-aware retry with server-suggested back-off
//! - Rate-limited decorators for the enumerator and item fetcher ports
//!
//! ## Modules
//!
//! - [`rate_limit`] - Limiters and the per-run limiter set
//! - [`retry`] - Retry loop for throttled calls
//! - [`throttled`] - Port decorators

pub mod rate_limit;
pub mod retry;
pub mod throttled;

use thiserror::Error;

pub use rate_limit::{Limiter, LimiterStats, RateLimiterSet, SlidingWindowLimiter, TokenBucketLimiter};
pub use retry::{with_retry, RetryPolicy};
pub use throttled::ThrottledEnumerator;

/// Errors raised by the throttling layer
#[derive(Debug, Error)]
pub enum GraphError {
    /// The service kept throttling past the retry limit
    #[error("{operation}: still throttled after {attempts} attempts")]
    RetriesExhausted { operation: String, attempts: u32 },
}
