//! Permission and link-share restore
//!
//! Stored metadata records what an item's sharing looked like, not how it got
//! there. Restore replays the difference between an item and the sharing it
//! would inherit from its nearest custom-shared ancestor:
//!
//! - permissions are inherited from the closest ancestor with custom sharing
//! - link shares accumulate over every custom-shared ancestor
//!
//! Every permission and link created here is recorded under its backup-time
//! ID, so a descendant that drops an inherited permission deletes the one
//! this restore created.
//!
//! Ancestors must be restored first: their metadata is read from the
//! parent-dir cache, keyed by storage path.

use tenantsync_core::domain::{CanonicalPath, DrivePath};
use tenantsync_core::fault::LabeledError;
use tenantsync_core::ports::{
    is_unresolved_recipients, LinkShareGrant, PermissionGrant, Recipient,
};
use tracing::{debug, info, warn};

use crate::caches::RestoreCaches;
use crate::error::RestoreError;
use crate::metadata::{
    diff_link_shares, diff_permissions, EntityType, ItemMetadata, LinkShareEntry,
    PermissionEntry, SharingMode,
};
use crate::restorer::{DriveRestorer, RestoreContext};

/// Role the service refuses to grant
const OWNER_ROLE: &str = "owner";

/// Sharing of the nearest custom-shared ancestor of `origin`.
///
/// Reaching the drive root means nothing is inherited.
pub fn previous_metadata(
    caches: &RestoreCaches,
    origin: &CanonicalPath,
) -> Result<ItemMetadata, RestoreError> {
    let mut parent = origin.dir()?;

    loop {
        if DrivePath::from_path(&parent)?.folders.is_empty() {
            return Ok(ItemMetadata::default());
        }

        let meta = parent_meta(caches, &parent)?;
        if meta.sharing_mode == SharingMode::Custom {
            return Ok(meta);
        }

        parent = parent.dir()?;
    }
}

/// Link shares of every custom-shared ancestor of `origin`
pub fn previous_link_shares(
    caches: &RestoreCaches,
    origin: &CanonicalPath,
) -> Result<Vec<LinkShareEntry>, RestoreError> {
    let mut shares = Vec::new();
    let mut parent = origin.dir()?;

    while !DrivePath::from_path(&parent)?.folders.is_empty() {
        let meta = parent_meta(caches, &parent)?;
        if meta.sharing_mode == SharingMode::Custom {
            shares.extend(meta.link_shares);
        }

        parent = parent.dir()?;
    }

    Ok(shares)
}

fn parent_meta(
    caches: &RestoreCaches,
    dir: &CanonicalPath,
) -> Result<ItemMetadata, RestoreError> {
    let key = dir.to_string();
    caches
        .parent_dir_meta(&key)
        .ok_or(RestoreError::MissingParentMetadata(key))
}

fn recover(ctx: &RestoreContext, label: &str, err: &RestoreError) {
    ctx.bus.add_recoverable(LabeledError::from_error(err).with_label(label));
}

impl DriveRestorer {
    /// Brings the sharing of a restored item (or folder) at `item_path` in
    /// line with `current`.
    ///
    /// Items that inherited their sharing are left alone. Failures to post a
    /// single permission or link are recoverable; a permission that must be
    /// removed but was never recreated fails the item.
    #[tracing::instrument(
        level = "debug",
        skip(self, ctx, item_path, current),
        fields(path = %item_path)
    )]
    pub async fn restore_permissions(
        &self,
        ctx: &RestoreContext,
        drive_id: &str,
        item_id: &str,
        item_path: &CanonicalPath,
        current: &ItemMetadata,
    ) -> Result<(), RestoreError> {
        if current.sharing_mode == SharingMode::Inherited {
            return Ok(());
        }

        let inherited_links = previous_link_shares(&self.caches, item_path)?;
        let (links_added, links_removed) =
            diff_link_shares(&inherited_links, &current.link_shares);

        // links first: dropping inherited links also drops inherited permissions
        let did_reset = self
            .update_link_shares(ctx, drive_id, item_id, &links_added, &links_removed)
            .await?;

        let previous = previous_metadata(&self.caches, item_path)?;
        let (mut added, mut removed) =
            diff_permissions(&previous.permissions, &current.permissions);

        if did_reset {
            debug!("Inherited permissions were reset, restoring all permissions");
            removed.clear();
            added = current.permissions.clone();
        }

        self.update_permissions(ctx, drive_id, item_id, &added, &removed)
            .await
    }

    /// Deletes `removed`, then grants `added`.
    ///
    /// Removed permissions are addressed by the ID this restore gave them.
    /// Owner roles are dropped from grants, and grants left with no roles or
    /// made to site groups are skipped.
    pub async fn update_permissions(
        &self,
        ctx: &RestoreContext,
        drive_id: &str,
        item_id: &str,
        added: &[PermissionEntry],
        removed: &[PermissionEntry],
    ) -> Result<(), RestoreError> {
        for perm in removed {
            let new_id = self
                .caches
                .permission_id(&perm.id)
                .ok_or_else(|| RestoreError::PermissionNotRemapped(perm.id.clone()))?;

            self.target
                .delete_item_permission(drive_id, item_id, &new_id)
                .await
                .map_err(|e| RestoreError::remote("removing permission", &e))?;

            debug!(permission_id = %perm.id, new_id = %new_id, "Removed inherited permission");
        }

        for perm in added {
            if ctx.bus.has_failure() {
                break;
            }

            let roles: Vec<String> = perm
                .roles
                .iter()
                .filter(|r| *r != OWNER_ROLE)
                .cloned()
                .collect();

            if roles.is_empty() || perm.entity_type == EntityType::SiteGroup {
                continue;
            }

            let recipient = if perm.entity_id.is_empty() {
                Recipient::Email(perm.email.clone())
            } else {
                Recipient::ObjectId(perm.entity_id.clone())
            };

            let grant = PermissionGrant {
                roles,
                recipient,
                expiration: perm.expiration.clone(),
            };

            match self.target.post_item_permission(drive_id, item_id, grant).await {
                Ok(new_id) => {
                    debug!(permission_id = %perm.id, new_id = %new_id, "Restored permission");
                    self.caches.set_permission_id(&perm.id, new_id);
                }
                Err(e) if is_unresolved_recipients(&e) => {
                    info!(permission_id = %perm.id, error = %e, "Unable to restore permission");
                }
                Err(e) => {
                    let err = RestoreError::remote("restoring permission", &e);
                    warn!(permission_id = %perm.id, error = %err, "Permission restore failed");
                    recover(ctx, "restore_permission", &err);
                }
            }
        }

        Ok(())
    }

    /// Creates `added` links on the item and returns whether the item's
    /// inherited sharing was dropped.
    ///
    /// Inherited links cannot be deleted one by one. The first link created
    /// decides whether inherited sharing is kept, so it drops it when any
    /// link was removed. With links removed and none to add, a throwaway
    /// link is created and deleted to the same effect. Password-protected
    /// links cannot be recreated and are skipped.
    pub async fn update_link_shares(
        &self,
        ctx: &RestoreContext,
        drive_id: &str,
        item_id: &str,
        added: &[LinkShareEntry],
        removed: &[LinkShareEntry],
    ) -> Result<bool, RestoreError> {
        let mut first = true;
        let mut did_reset = false;

        for link in added {
            if ctx.bus.has_failure() {
                break;
            }

            if link.has_password {
                debug!(link_share_id = %link.id, "Skipping password protected link");
                continue;
            }

            let recipients = link
                .entities
                .iter()
                .filter(|e| e.entity_type != EntityType::SiteGroup)
                .map(|e| e.id.clone())
                .collect();

            let retain_inherited = first.then(|| removed.is_empty());
            if first {
                first = false;
                did_reset = !removed.is_empty();
            }

            let grant = LinkShareGrant {
                link_type: link.link.link_type.clone(),
                scope: link.link.scope.clone(),
                recipients,
                expiration: link.expiration.clone(),
                retain_inherited,
            };

            match self.target.post_item_link_share(drive_id, item_id, grant).await {
                Ok(new_id) => {
                    debug!(link_share_id = %link.id, new_id = %new_id, "Restored link share");
                    self.caches.set_link_share_id(&link.id, new_id);
                }
                Err(e) if is_unresolved_recipients(&e) => {
                    info!(link_share_id = %link.id, error = %e, "Unable to restore link share");
                }
                Err(e) => {
                    let err = RestoreError::remote("restoring link share", &e);
                    warn!(link_share_id = %link.id, error = %err, "Link share restore failed");
                    recover(ctx, "restore_link_share", &err);
                }
            }
        }

        if !removed.is_empty() && added.is_empty() {
            // a users link shared with nobody grants nothing if the delete fails
            let throwaway = LinkShareGrant {
                link_type: "view".to_string(),
                scope: "users".to_string(),
                recipients: Vec::new(),
                expiration: None,
                retain_inherited: Some(false),
            };

            let link_id = self
                .target
                .post_item_link_share(drive_id, item_id, throwaway)
                .await
                .map_err(|e| RestoreError::remote("resetting inherited link shares", &e))?;
            did_reset = true;

            self.target
                .delete_item_permission(drive_id, item_id, &link_id)
                .await
                .map_err(|e| RestoreError::remote("removing reset link share", &e))?;
        }

        Ok(did_reset)
    }
}
