//! Classified remote errors
//!
//! Port methods return `anyhow::Result`, as adapter failures are
//! adapter-specific. The few outcomes the engines must react to (missing
//! targets, name conflicts, throttling) are expressed as [`RemoteError`]
//! variants that adapters put into the `anyhow` chain and the engines
//! recover with the `is_*` helpers below.

use std::time::Duration;

use thiserror::Error;

/// Remote failures the backup and restore engines branch on
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The target no longer exists (deleted in flight, stale cache entry)
    #[error("Not found: {0}")]
    NotFound(String),

    /// An item or container with the same name already exists
    #[error("Item already exists: {0}")]
    AlreadyExists(String),

    /// The delta token is no longer accepted and must be discarded
    #[error("Delta token expired: {0}")]
    InvalidDelta(String),

    /// Rate limit exceeded; retry after the specified duration
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Duration to wait before retrying
        retry_after: Duration,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// One or more sharing recipients do not exist in the destination tenant
    #[error("Recipients could not be resolved: {0}")]
    UnresolvedRecipients(String),
}

fn find(err: &anyhow::Error) -> Option<&RemoteError> {
    err.chain().find_map(|e| e.downcast_ref::<RemoteError>())
}

/// True when the chain contains [`RemoteError::NotFound`]
#[must_use]
pub fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(find(err), Some(RemoteError::NotFound(_)))
}

/// True when the chain contains [`RemoteError::AlreadyExists`]
#[must_use]
pub fn is_already_exists(err: &anyhow::Error) -> bool {
    matches!(find(err), Some(RemoteError::AlreadyExists(_)))
}

/// True when the chain contains [`RemoteError::InvalidDelta`]
#[must_use]
pub fn is_invalid_delta(err: &anyhow::Error) -> bool {
    matches!(find(err), Some(RemoteError::InvalidDelta(_)))
}

/// True when the chain contains [`RemoteError::UnresolvedRecipients`]
#[must_use]
pub fn is_unresolved_recipients(err: &anyhow::Error) -> bool {
    matches!(find(err), Some(RemoteError::UnresolvedRecipients(_)))
}

/// Suggested wait when the chain contains [`RemoteError::TooManyRequests`]
#[must_use]
pub fn throttled_for(err: &anyhow::Error) -> Option<Duration> {
    match find(err) {
        Some(RemoteError::TooManyRequests { retry_after }) => Some(*retry_after),
        _ => None,
    }
}
