//! Restore caches
//!
//! Every map a restore consults or mutates while collections are processed
//! concurrently. All maps are `DashMap`s, so callers never lock; the raw maps
//! are private and only reachable through the methods below.
//!
//! The caches live for one restore operation. [`RestoreCaches::populate`]
//! seeds the drive maps with one scan of the destination; the remaining maps
//! fill up as drives, folders, and items are created.

use dashmap::DashMap;
use tenantsync_core::domain::CollisionKey;
use tenantsync_core::ports::{DriveDescriptor, DriveItemInfo, IDriveRestoreTarget};
use tracing::{debug, info};

use crate::error::RestoreError;
use crate::metadata::ItemMetadata;

/// A destination drive and its root folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveInfo {
    pub id: String,
    pub name: String,
    pub root_folder_id: String,
}

/// The existing destination item behind a collision key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollisionEntry {
    pub item_id: String,
    pub is_folder: bool,
}

/// Concurrent caches for one restore operation
#[derive(Debug, Default)]
pub struct RestoreCaches {
    /// Drive ID -> name as recorded at backup time
    backup_drive_names: DashMap<String, String>,
    drives_by_id: DashMap<String, DriveInfo>,
    drives_by_name: DashMap<String, DriveInfo>,
    /// `driveID/location...` -> folder
    folders: DashMap<String, DriveItemInfo>,
    collision_keys: DashMap<CollisionKey, CollisionEntry>,
    old_permission_ids: DashMap<String, String>,
    old_link_share_ids: DashMap<String, String>,
    parent_dir_to_meta: DashMap<String, ItemMetadata>,
}

impl RestoreCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates caches that know the backup-time drive names
    pub fn with_backup_drive_names<I, K, V>(names: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let caches = Self::new();
        for (id, name) in names {
            caches.set_backup_drive_name(id, name);
        }
        caches
    }

    // ========================================================================
    // Drives
    // ========================================================================

    /// Lists every drive reachable for `owner` and caches each one.
    ///
    /// An owner with no drives is not an error.
    #[tracing::instrument(level = "debug", skip(self, target))]
    pub async fn populate(
        &self,
        target: &dyn IDriveRestoreTarget,
        owner: &str,
    ) -> Result<(), RestoreError> {
        let drives = target
            .list_drives(owner)
            .await
            .map_err(|e| RestoreError::remote("getting drives", &e))?;

        for drive in drives {
            self.add_drive(target, drive).await?;
        }

        info!(drives = self.drives_by_id.len(), "Restore caches populated");
        Ok(())
    }

    /// Looks up the drive's root folder and caches the drive by ID and name
    pub async fn add_drive(
        &self,
        target: &dyn IDriveRestoreTarget,
        drive: DriveDescriptor,
    ) -> Result<DriveInfo, RestoreError> {
        let root = target
            .get_root_folder(&drive.id)
            .await
            .map_err(|e| RestoreError::remote(format!("getting root folder of drive {}", drive.id), &e))?;

        let info = DriveInfo {
            id: drive.id,
            name: drive.name,
            root_folder_id: root.id,
        };

        debug!(drive_id = %info.id, root_folder_id = %info.root_folder_id, "Drive cached");

        self.drives_by_id.insert(info.id.clone(), info.clone());
        self.drives_by_name.insert(info.name.clone(), info.clone());
        Ok(info)
    }

    #[must_use]
    pub fn drive_by_id(&self, id: &str) -> Option<DriveInfo> {
        self.drives_by_id.get(id).map(|r| r.clone())
    }

    #[must_use]
    pub fn drive_by_name(&self, name: &str) -> Option<DriveInfo> {
        self.drives_by_name.get(name).map(|r| r.clone())
    }

    /// Records a drive's name at backup time
    pub fn set_backup_drive_name(&self, id: impl Into<String>, name: impl Into<String>) {
        self.backup_drive_names.insert(id.into(), name.into());
    }

    /// Drive name at backup time
    #[must_use]
    pub fn backup_drive_name(&self, id: &str) -> Option<String> {
        self.backup_drive_names.get(id).map(|r| r.clone())
    }

    // ========================================================================
    // Folders
    // ========================================================================

    #[must_use]
    pub fn get_folder(&self, location: &str) -> Option<DriveItemInfo> {
        self.folders.get(location).map(|r| r.clone())
    }

    pub fn set_folder(&self, location: impl Into<String>, folder: DriveItemInfo) {
        self.folders.insert(location.into(), folder);
    }

    // ========================================================================
    // Collision keys
    // ========================================================================

    /// Fetches the direct children of a destination folder and indexes them
    /// by collision key.
    pub async fn populate_collision_keys(
        &self,
        target: &dyn IDriveRestoreTarget,
        drive_id: &str,
        folder_id: &str,
    ) -> Result<usize, RestoreError> {
        let children = target
            .get_items_in_container(drive_id, folder_id)
            .await
            .map_err(|e| RestoreError::remote("generating map of item collision keys", &e))?;

        let count = children.len();
        for child in children {
            self.add_collision_key(
                CollisionKey::new(folder_id, &child.name),
                CollisionEntry {
                    item_id: child.id,
                    is_folder: child.is_folder,
                },
            );
        }

        debug!(drive_id, folder_id, count, "Collision keys populated");
        Ok(count)
    }

    pub fn add_collision_key(&self, key: CollisionKey, entry: CollisionEntry) {
        self.collision_keys.insert(key, entry);
    }

    #[must_use]
    pub fn collision_entry(&self, key: &CollisionKey) -> Option<CollisionEntry> {
        self.collision_keys.get(key).map(|r| r.clone())
    }

    pub fn remove_collision_key(&self, key: &CollisionKey) -> Option<CollisionEntry> {
        self.collision_keys.remove(key).map(|(_, v)| v)
    }

    // ========================================================================
    // Permission and link-share remaps
    // ========================================================================

    /// Records the ID a restored permission got, under its backup-time ID
    pub fn set_permission_id(&self, old: impl Into<String>, new: impl Into<String>) {
        self.old_permission_ids.insert(old.into(), new.into());
    }

    #[must_use]
    pub fn permission_id(&self, old: &str) -> Option<String> {
        self.old_permission_ids.get(old).map(|r| r.clone())
    }

    pub fn set_link_share_id(&self, old: impl Into<String>, new: impl Into<String>) {
        self.old_link_share_ids.insert(old.into(), new.into());
    }

    #[must_use]
    pub fn link_share_id(&self, old: &str) -> Option<String> {
        self.old_link_share_ids.get(old).map(|r| r.clone())
    }

    // ========================================================================
    // Parent directory metadata
    // ========================================================================

    /// Stores the metadata of the directory at `dir` (a storage path)
    pub fn set_parent_dir_meta(&self, dir: impl Into<String>, meta: ItemMetadata) {
        self.parent_dir_to_meta.insert(dir.into(), meta);
    }

    #[must_use]
    pub fn parent_dir_meta(&self, dir: &str) -> Option<ItemMetadata> {
        self.parent_dir_to_meta.get(dir).map(|r| r.clone())
    }
}
