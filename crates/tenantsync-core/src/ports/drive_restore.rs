//! Drive restore port (driven/secondary port)
//!
//! The restore engine recreates drives, folders, and files through this
//! interface. Name collisions reported by the service surface as
//! [`RemoteError::AlreadyExists`](super::errors::RemoteError), deletes of
//! vanished items as [`RemoteError::NotFound`](super::errors::RemoteError).
//!
//! Sharing is restored through invitations and sharing links. Both come back
//! as permissions on the item, so both are removed with
//! [`IDriveRestoreTarget::delete_item_permission`]. Recipients the
//! destination cannot resolve surface as
//! [`RemoteError::UnresolvedRecipients`](super::errors::RemoteError).

use serde::{Deserialize, Serialize};

use crate::domain::CollisionPolicy;

/// A drive (document library) at the destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveDescriptor {
    pub id: String,
    pub name: String,
}

/// A file or folder at the destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveItemInfo {
    pub id: String,
    pub name: String,
    pub is_folder: bool,
}

/// An item to create under a parent folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDriveItem {
    pub name: String,
    pub is_folder: bool,
    /// File content; ignored for folders
    pub content: Vec<u8>,
}

impl NewDriveItem {
    /// A folder with the given name
    pub fn folder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_folder: true,
            content: Vec::new(),
        }
    }

    /// A file with the given name and content
    pub fn file(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            is_folder: false,
            content,
        }
    }
}

/// Who an invitation is addressed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// A directory object (user, group, application, device)
    ObjectId(String),
    /// Older backups only recorded the grantee's address
    Email(String),
}

/// An invitation granting `roles` on an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionGrant {
    pub roles: Vec<String>,
    pub recipient: Recipient,
    /// ISO 8601 expiry, if the original grant had one
    pub expiration: Option<String>,
}

/// A sharing link to create on an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkShareGrant {
    /// `view`, `edit`, ...
    pub link_type: String,
    /// `anonymous`, `organization`, `users`
    pub scope: String,
    /// Object IDs the link is shared with
    pub recipients: Vec<String>,
    pub expiration: Option<String>,
    /// Only honoured on the first link created on an item. `Some(false)`
    /// drops every permission the item inherited.
    pub retain_inherited: Option<bool>,
}

/// Port trait for drive-backed restore targets
#[async_trait::async_trait]
pub trait IDriveRestoreTarget: Send + Sync {
    /// Lists every drive the restoring identity can reach for `owner`
    async fn list_drives(&self, owner: &str) -> anyhow::Result<Vec<DriveDescriptor>>;

    /// Fetches the root folder of a drive
    async fn get_root_folder(&self, drive_id: &str) -> anyhow::Result<DriveItemInfo>;

    /// Creates a drive named `name`
    async fn post_drive(&self, owner: &str, name: &str) -> anyhow::Result<DriveDescriptor>;

    /// Creates an item under `parent_folder_id`
    ///
    /// `on_collision` tells the service how to resolve an existing item with
    /// the same name: `Copy` asks for a disambiguated name, `Replace`
    /// overwrites, `Skip` fails with an already-exists error.
    async fn post_item_in_container(
        &self,
        drive_id: &str,
        parent_folder_id: &str,
        item: NewDriveItem,
        on_collision: CollisionPolicy,
    ) -> anyhow::Result<DriveItemInfo>;

    /// Deletes an item
    async fn delete_item(&self, drive_id: &str, item_id: &str) -> anyhow::Result<()>;

    /// Lists the direct children of a folder
    async fn get_items_in_container(
        &self,
        drive_id: &str,
        folder_id: &str,
    ) -> anyhow::Result<Vec<DriveItemInfo>>;

    /// Invites a recipient onto an item without notifying them.
    ///
    /// Returns the ID of the created permission.
    async fn post_item_permission(
        &self,
        drive_id: &str,
        item_id: &str,
        grant: PermissionGrant,
    ) -> anyhow::Result<String>;

    /// Creates a sharing link on an item and returns its permission ID
    async fn post_item_link_share(
        &self,
        drive_id: &str,
        item_id: &str,
        link: LinkShareGrant,
    ) -> anyhow::Result<String>;

    /// Removes a permission or sharing link from an item
    async fn delete_item_permission(
        &self,
        drive_id: &str,
        item_id: &str,
        permission_id: &str,
    ) -> anyhow::Result<()>;
}
