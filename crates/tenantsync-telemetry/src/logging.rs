//! Subscriber initialization
//!
//! `RUST_LOG` overrides the configured level when set.

use tenantsync_core::config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("unknown log format: {0}")]
    UnknownFormat(String),

    #[error("invalid log level {level}: {message}")]
    InvalidLevel { level: String, message: String },

    #[error("a global subscriber is already installed")]
    AlreadyInitialized,
}

/// Output format of the log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Result<Self, LoggingError> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(LoggingError::UnknownFormat(other.to_string())),
        }
    }
}

/// Builds the level filter, preferring `RUST_LOG` over the configured level
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(&config.level).map_err(|e| LoggingError::InvalidLevel {
        level: config.level.clone(),
        message: e.to_string(),
    })
}

/// Installs the global `tracing` subscriber.
///
/// Fails if one is already installed, so call it once at process start.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let format = LogFormat::parse(&config.format)?;
    let filter = env_filter(config)?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|_| LoggingError::AlreadyInitialized)
}
