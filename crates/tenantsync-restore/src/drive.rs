//! Destination drive materialization
//!
//! Backed-up drive IDs rarely survive into the destination: the drive may be
//! gone, recreated under a new ID, or the restore may target another owner.
//! [`DriveRestorer::ensure_drive_exists`] maps a backed-up drive onto a
//! destination drive, creating one when nothing matches.

use tenantsync_core::count::CounterKey;
use tenantsync_core::domain::DrivePath;
use tenantsync_core::ports::is_already_exists;
use tracing::{debug, info};

use crate::caches::DriveInfo;
use crate::error::RestoreError;
use crate::restorer::{DriveRestorer, RestoreContext};

impl DriveRestorer {
    /// Returns the destination drive for `drive_path`.
    ///
    /// Resolution order:
    /// 1. a configured target drive, adopted by name when it exists
    /// 2. a cached drive with the backed-up ID
    /// 3. a cached drive carrying the backed-up drive's name
    /// 4. a new drive named after the backed-up drive, or `fallback_name`
    ///
    /// Name conflicts on creation are retried as `"<name> 1"`, `"<name> 2"`,
    /// and so on. Any other creation error is returned.
    #[tracing::instrument(level = "debug", skip(self, ctx, drive_path), fields(drive_id = %drive_path.drive_id))]
    pub async fn ensure_drive_exists(
        &self,
        ctx: &RestoreContext,
        drive_path: &DrivePath,
        owner: &str,
        fallback_name: &str,
    ) -> Result<DriveInfo, RestoreError> {
        let mut new_name = fallback_name.to_string();

        if !self.config.drive.is_empty() {
            if let Some(drive) = self.caches.drive_by_name(&self.config.drive) {
                return Ok(drive);
            }
        } else {
            if let Some(drive) = self.caches.drive_by_id(&drive_path.drive_id) {
                return Ok(drive);
            }

            if let Some(old_name) = self.caches.backup_drive_name(&drive_path.drive_id) {
                if let Some(drive) = self.caches.drive_by_name(&old_name) {
                    debug!(name = %old_name, new_id = %drive.id, "Adopting drive with backed-up name");
                    return Ok(drive);
                }

                new_name = old_name;
            }
        }

        let mut next_name = new_name.clone();
        let mut attempt = 1;

        let created = loop {
            if ctx.cancel.is_cancelled() {
                return Err(RestoreError::Cancelled);
            }

            match self.target.post_drive(owner, &next_name).await {
                Ok(drive) => break drive,
                Err(e) if is_already_exists(&e) => {
                    debug!(name = %next_name, "Drive name taken, retrying with suffix");
                    next_name = format!("{new_name} {attempt}");
                    attempt += 1;
                }
                Err(e) => return Err(RestoreError::remote("creating new drive", &e)),
            }
        };

        ctx.counter.inc(CounterKey::NewDriveCreated);
        info!(drive_id = %created.id, name = %created.name, "Created destination drive");

        self.caches.add_drive(self.target.as_ref(), created).await
    }
}
