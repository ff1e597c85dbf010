//! TenantSync Backup - Incremental reconciliation engine
//!
//! Provides:
//! - Canonical path resolution for enumerated containers
//! - Scope matching over container locations
//! - Per-category handler capabilities
//! - Reconciliation of previous delta/path state against current enumeration
//! - Bounded, cancellable item streaming per collection
//! - Metadata collection building and parsing
//!
//! ## Modules
//!
//! - [`resolver`] - Container ID -> canonical path resolution
//! - [`scope`] - Glob-based include/exclude matching
//! - [`handler`] - Category handler capability set
//! - [`reconcile`] - The reconciliation engine
//! - [`collection`] - Item streaming for produced collections
//! - [`metadata`] - Previous-path and delta metadata files
//! - [`producer`] - Multi-category backup orchestration

pub mod collection;
pub mod handler;
pub mod metadata;
pub mod producer;
pub mod reconcile;
pub mod resolver;
pub mod scope;

use tenantsync_core::fault::LabeledError;
use thiserror::Error;

pub use collection::{BackupCollection, StreamItem};
pub use handler::CategoryHandler;
pub use metadata::{make_metadata_collection, parse_metadata_collections, ParsedMetadata};
pub use producer::{BackupOutcome, BackupProducer};
pub use reconcile::{BackupContext, ReconcileOutput, Reconciler};
pub use resolver::{ContainerResolver, PathError, ResolvedPaths};
pub use scope::{GlobScope, ScopeMatcher};

/// Errors that abort a category (or the whole run)
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The run was cancelled before the category finished
    #[error("backup cancelled")]
    Cancelled,

    /// The metadata collection could not be built
    #[error("building metadata collection: {0}")]
    Metadata(String),

    /// Invalid glob pattern in a scope rule
    #[error("invalid scope pattern: {pattern}: {reason}")]
    InvalidScope { pattern: String, reason: String },

    /// The fault bus recorded a hard failure
    #[error("backup failed: {0}")]
    Failed(LabeledError),
}
