//! TenantSync Restore - Drive restore engine
//!
//! Provides:
//! - Concurrent restore caches (drives, folders, collision keys, metadata)
//! - Destination drive materialization with name-conflict retries
//! - Restore folder hierarchy creation
//! - Item restore with Skip / Copy / Replace collision resolution
//! - Permission and link-share restore with old-to-new ID remapping
//! - Directory metadata augmentation of restore selections
//!
//! ## Modules
//!
//! - [`caches`] - Shared restore caches
//! - [`drive`] - Destination drive materialization
//! - [`folders`] - Restore folder hierarchy
//! - [`item`] - Item restore and collision resolution
//! - [`restorer`] - Collection restore orchestration
//! - [`augment`] - Restore path augmentation
//! - [`metadata`] - Item and directory metadata entries
//! - [`permissions`] - Sharing restore

pub mod augment;
pub mod caches;
pub mod drive;
pub mod error;
pub mod folders;
pub mod item;
pub mod metadata;
pub mod permissions;
pub mod restorer;

pub use augment::{augment_restore_paths, RestorePaths};
pub use caches::{CollisionEntry, DriveInfo, RestoreCaches};
pub use error::RestoreError;
pub use item::ItemOutcome;
pub use metadata::{ItemMetadata, SharingMode};
pub use restorer::{
    CollectionMetrics, DriveRestorer, RestoreCollection, RestoreContext, RestoreOutcome,
    StoredItem,
};
