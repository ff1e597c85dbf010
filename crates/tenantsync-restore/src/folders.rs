//! Restore folder hierarchy
//!
//! Folders are created top-down under the destination drive's root. Every
//! folder that exists or was created is cached by `driveID/location`, so
//! collections sharing ancestors create each folder once.

use tenantsync_core::count::CounterKey;
use tenantsync_core::domain::{CollisionPolicy, PathBuilder};
use tenantsync_core::ports::{is_already_exists, DriveItemInfo, NewDriveItem};
use tracing::debug;

use crate::error::RestoreError;
use crate::restorer::{DriveRestorer, RestoreContext};

impl DriveRestorer {
    /// Creates every folder of `restore_dir` below the root of `drive_id` and
    /// returns the ID of the deepest one.
    ///
    /// An empty `restore_dir` resolves to the drive root.
    pub async fn create_restore_folders(
        &self,
        ctx: &RestoreContext,
        drive_id: &str,
        restore_dir: &PathBuilder,
    ) -> Result<String, RestoreError> {
        let drive = self
            .caches
            .drive_by_id(drive_id)
            .ok_or_else(|| RestoreError::DriveNotCached(drive_id.to_string()))?;

        let mut location = PathBuilder::from_elements([drive_id]);
        let mut parent_id = drive.root_folder_id;

        for name in restore_dir.as_elements() {
            location = location.append(name.as_str());
            let key = location.to_string();

            if let Some(folder) = self.caches.get_folder(&key) {
                parent_id = folder.id;
                continue;
            }

            if ctx.cancel.is_cancelled() {
                return Err(RestoreError::Cancelled);
            }

            let folder = self.create_folder(drive_id, &parent_id, name).await?;
            ctx.counter.inc(CounterKey::NewFolderCreated);
            debug!(location = %key, folder_id = %folder.id, "Resolved restore destination");

            parent_id = folder.id.clone();
            self.caches.set_folder(key, folder);
        }

        Ok(parent_id)
    }

    /// Creates a folder, or returns the existing one of that name.
    ///
    /// `Replace` turns a post onto an existing folder into a lookup. It only
    /// conflicts when a file holds the name, in which case the folder is
    /// created as a copy next to it.
    pub(crate) async fn create_folder(
        &self,
        drive_id: &str,
        parent_id: &str,
        name: &str,
    ) -> Result<DriveItemInfo, RestoreError> {
        match self
            .target
            .post_item_in_container(
                drive_id,
                parent_id,
                NewDriveItem::folder(name),
                CollisionPolicy::Replace,
            )
            .await
        {
            Ok(folder) => Ok(folder),
            Err(e) if is_already_exists(&e) => {
                debug!(name, parent_id, "File holds the folder name, creating a copy");
                self.target
                    .post_item_in_container(
                        drive_id,
                        parent_id,
                        NewDriveItem::folder(name),
                        CollisionPolicy::Copy,
                    )
                    .await
                    .map_err(|e| RestoreError::remote("creating folder", &e))
            }
            Err(e) => Err(RestoreError::remote("creating folder", &e)),
        }
    }
}
