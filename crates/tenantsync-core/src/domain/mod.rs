//! Domain entities and business logic
//!
//! This module contains the core domain types for TenantSync:
//! - Newtypes for remote identifiers and delta tokens
//! - Canonical tenant-scoped paths
//! - Containers, collections, and the delta state carried between runs
//! - Restore collision policy and keys
//! - Backup format versions
//! - Domain-specific error types

pub mod collection;
pub mod collision;
pub mod container;
pub mod errors;
pub mod newtypes;
pub mod path;
pub mod version;

// Re-export commonly used types
pub use collection::{
    CategoryDeltaPaths, Collection, CollectionState, DeltaPath, DeltaPaths, MetadataCollection,
    MetadataFile, DELTA_URLS_FILE_NAME, PREVIOUS_PATH_FILE_NAME,
};
pub use collision::{CollisionKey, CollisionPolicy};
pub use container::Container;
pub use errors::DomainError;
pub use newtypes::*;
pub use path::{CanonicalPath, Category, DrivePath, PathBuilder, Service};
