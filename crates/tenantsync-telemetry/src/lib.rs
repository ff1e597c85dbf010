//! TenantSync Telemetry - Logging and metrics
//!
//! Provides:
//! - `tracing` subscriber setup from [`LoggingConfig`](tenantsync_core::config::LoggingConfig)
//! - A Prometheus registry fed from the counter bus, run outcomes and
//!   rate limiter statistics
//!
//! ## Modules
//!
//! - [`logging`] - Subscriber initialization
//! - [`metrics`] - Prometheus registry and text encoding

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LoggingError};
pub use metrics::MetricsRegistry;
