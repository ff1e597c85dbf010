//! Error types for the restore engine

use tenantsync_core::domain::DomainError;
use thiserror::Error;

/// Errors that fail a restore step
#[derive(Debug, Error)]
pub enum RestoreError {
    /// A stored or destination path is malformed
    #[error("invalid path: {0}")]
    Path(#[from] DomainError),

    /// A drive was expected in the cache but is missing
    #[error("drive not cached: {0}")]
    DriveNotCached(String),

    /// A remote call failed; the message keeps the whole error chain
    #[error("{operation}: {message}")]
    Remote { operation: String, message: String },

    /// The restore hierarchy cannot hold the storage hierarchy
    #[error("restore path {restore_path} shorter than storage path {storage_path}")]
    RestorePathTooShort {
        restore_path: String,
        storage_path: String,
    },

    /// Item metadata could not be read
    #[error("reading item metadata {name}: {message}")]
    Metadata { name: String, message: String },

    /// The item's metadata carried no file name
    #[error("item with empty name: {0}")]
    EmptyItemName(String),

    /// A parent folder's metadata is needed to compute sharing but was not
    /// restored before the item
    #[error("no metadata found for parent folder {0}")]
    MissingParentMetadata(String),

    /// A permission to remove was never recreated by this restore
    #[error("no restored permission for {0}")]
    PermissionNotRemapped(String),

    /// Restore configuration is not usable
    #[error("invalid restore configuration: {0}")]
    InvalidConfig(String),

    #[error("restore cancelled")]
    Cancelled,
}

impl RestoreError {
    /// Wraps a port error, flattening its chain into the message.
    pub fn remote(operation: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::Remote {
            operation: operation.into(),
            message: format!("{err:#}"),
        }
    }
}
