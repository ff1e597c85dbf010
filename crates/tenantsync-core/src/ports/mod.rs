//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the engines depend on,
//! but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IContainerEnumerator`] - Container listing and per-container item changes
//! - [`IItemFetcher`] - Per-item payload retrieval during streaming
//! - [`IDriveRestoreTarget`] - Drive, folder, file, and sharing restore

pub mod container_enumerator;
pub mod drive_restore;
pub mod errors;

pub use container_enumerator::{AddedAndRemoved, IContainerEnumerator, IItemFetcher, ItemQueryOptions};
pub use drive_restore::{
    DriveDescriptor, DriveItemInfo, IDriveRestoreTarget, LinkShareGrant, NewDriveItem,
    PermissionGrant, Recipient,
};
pub use errors::{
    is_already_exists, is_invalid_delta, is_not_found, is_unresolved_recipients, throttled_for,
    RemoteError,
};
