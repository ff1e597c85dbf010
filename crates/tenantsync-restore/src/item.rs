//! Item restore and collision resolution
//!
//! Entry names depend on the backup format version:
//!
//! | version | entry                   | restored name                      |
//! |---------|-------------------------|------------------------------------|
//! | 0       | `<name>`                | the entry name                     |
//! | 1 to 5  | `<name>.data`           | the entry name without `.data`     |
//! | 6+      | `<id>.data`             | `fileName` of the `<id>.meta` entry |
//!
//! `.meta` and `.dirmeta` entries are never restored as files. With
//! permissions included, the sharing recorded in an item's `.meta` entry is
//! restored once the file exists.

use tenantsync_core::count::CounterKey;
use tenantsync_core::domain::version::{
    DATA_FILE_SUFFIX, DIR_META_FILE_SUFFIX, META_FILE_SUFFIX, ONE_DRIVE_1_DATA_AND_META_FILES,
    ONE_DRIVE_4_DIR_INCLUDES_PERMISSIONS, ONE_DRIVE_6_NAME_IN_META,
};
use tenantsync_core::domain::{CollisionKey, CollisionPolicy};
use tenantsync_core::ports::{is_not_found, DriveItemInfo, NewDriveItem};
use tracing::{debug, trace};

use crate::caches::CollisionEntry;
use crate::error::RestoreError;
use crate::metadata::ItemMetadata;
use crate::restorer::{DriveRestorer, RestoreCollection, RestoreContext, StoredItem};

/// Reads the `.meta` companion of the `.data` entry named `<stem>.data`
fn item_metadata(collection: &RestoreCollection, stem: &str) -> Result<ItemMetadata, RestoreError> {
    let meta_name = format!("{stem}{META_FILE_SUFFIX}");
    let entry = collection
        .fetch(&meta_name)
        .ok_or_else(|| RestoreError::Metadata {
            name: meta_name.clone(),
            message: "item metadata not found".to_string(),
        })?;

    ItemMetadata::from_slice(&meta_name, &entry.data)
}

/// What happened to one stored entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The item now exists at the destination
    Restored(DriveItemInfo),
    /// Nothing was written: a metadata entry, or a collision under `Skip`
    Skipped,
}

impl DriveRestorer {
    /// Restores one stored entry of `collection` into `folder_id`
    pub async fn restore_item(
        &self,
        ctx: &RestoreContext,
        drive_id: &str,
        folder_id: &str,
        collection: &RestoreCollection,
        item: &StoredItem,
    ) -> Result<ItemOutcome, RestoreError> {
        if ctx.cancel.is_cancelled() {
            return Err(RestoreError::Cancelled);
        }

        if self.backup_version < ONE_DRIVE_1_DATA_AND_META_FILES {
            return self
                .restore_file(ctx, drive_id, folder_id, &item.name, &item.data)
                .await;
        }

        if item.name.ends_with(META_FILE_SUFFIX) {
            // read through the sibling .data entry
            return Ok(ItemOutcome::Skipped);
        }

        if item.name.ends_with(DIR_META_FILE_SUFFIX) {
            self.store_dir_meta(collection, item)?;
            return Ok(ItemOutcome::Skipped);
        }

        let Some(trimmed) = item.name.strip_suffix(DATA_FILE_SUFFIX) else {
            trace!(item = %item.name, "Ignoring unknown entry");
            return Ok(ItemOutcome::Skipped);
        };

        let (name, meta) = if self.backup_version < ONE_DRIVE_6_NAME_IN_META {
            (trimmed.to_string(), None)
        } else {
            let meta = item_metadata(collection, trimmed)?;
            if meta.file_name.is_empty() {
                return Err(RestoreError::EmptyItemName(item.name.clone()));
            }
            (meta.file_name.clone(), Some(meta))
        };

        let outcome = self
            .restore_file(ctx, drive_id, folder_id, &name, &item.data)
            .await?;

        let ItemOutcome::Restored(created) = &outcome else {
            return Ok(outcome);
        };
        if !self.config.include_permissions {
            return Ok(outcome);
        }

        let meta = match meta {
            Some(meta) => meta,
            None => item_metadata(collection, trimmed)?,
        };
        let item_path = collection.full_path().append(&item.name, true)?;
        self.restore_permissions(ctx, drive_id, &created.id, &item_path, &meta)
            .await?;

        Ok(outcome)
    }

    /// Keeps a child folder's metadata for when its own collection restores.
    ///
    /// Only backups older than v4 store folder metadata in the parent.
    fn store_dir_meta(
        &self,
        collection: &RestoreCollection,
        item: &StoredItem,
    ) -> Result<(), RestoreError> {
        if !self.config.include_permissions
            || self.backup_version >= ONE_DRIVE_4_DIR_INCLUDES_PERMISSIONS
        {
            return Ok(());
        }

        let meta = ItemMetadata::from_slice(&item.name, &item.data)?;
        let item_path = collection.full_path().append(&item.name, true)?.to_string();
        let dir = item_path
            .strip_suffix(DIR_META_FILE_SUFFIX)
            .unwrap_or(&item_path);

        self.caches.set_parent_dir_meta(dir, meta);
        Ok(())
    }

    /// Creates a file under `parent_id`, resolving an existing item with the
    /// same name by the configured collision policy.
    ///
    /// - `Skip`: nothing is created or deleted
    /// - `Copy`: the file is created next to the existing one
    /// - `Replace`: an existing file is deleted first; a folder is left alone
    ///
    /// Creates always post with `Copy` so the service picks a free name
    /// instead of failing.
    pub async fn restore_file(
        &self,
        ctx: &RestoreContext,
        drive_id: &str,
        parent_id: &str,
        name: &str,
        content: &[u8],
    ) -> Result<ItemOutcome, RestoreError> {
        let key = CollisionKey::new(parent_id, name);
        let mut replaced = false;

        if let Some(existing) = self.caches.collision_entry(&key) {
            match self.config.on_collision {
                CollisionPolicy::Skip => {
                    ctx.counter.inc(CounterKey::CollisionSkip);
                    debug!(collision_key = %key, "Skipping colliding item");
                    return Ok(ItemOutcome::Skipped);
                }
                CollisionPolicy::Replace if !existing.is_folder => {
                    match self.target.delete_item(drive_id, &existing.item_id).await {
                        Ok(()) => {}
                        Err(e) if is_not_found(&e) => {
                            debug!(item_id = %existing.item_id, "Item to replace is already gone");
                        }
                        Err(e) => {
                            return Err(RestoreError::remote("deleting colliding item", &e));
                        }
                    }
                    self.caches.remove_collision_key(&key);
                    replaced = true;
                }
                CollisionPolicy::Replace | CollisionPolicy::Copy => {}
            }
        }

        let created = self
            .target
            .post_item_in_container(
                drive_id,
                parent_id,
                NewDriveItem::file(name, content.to_vec()),
                CollisionPolicy::Copy,
            )
            .await
            .map_err(|e| RestoreError::remote("creating item", &e))?;

        self.caches.add_collision_key(
            CollisionKey::new(parent_id, &created.name),
            CollisionEntry {
                item_id: created.id.clone(),
                is_folder: false,
            },
        );

        ctx.counter.inc(if replaced {
            CounterKey::CollisionReplace
        } else {
            CounterKey::NewItemCreated
        });

        Ok(ItemOutcome::Restored(created))
    }
}
