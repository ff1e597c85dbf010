//! Item and directory metadata stored alongside drive data
//!
//! Since format version 1 every file has a `.meta` companion and every
//! directory a `.dirmeta` entry, both JSON. Version 6 moved the file name
//! into the metadata, so the storage name of a `.data` entry is no longer
//! the name to restore under.

use serde::{Deserialize, Serialize};

use crate::error::RestoreError;

/// Whether an item had its own sharing or took its parent's
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SharingMode {
    /// Metadata written without a mode is treated as custom
    #[default]
    Custom,
    Inherited,
}

/// Kind of principal a permission or link is granted to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    #[default]
    User,
    Group,
    Application,
    Device,
    SiteUser,
    SiteGroup,
}

/// A permission granted on an item at backup time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermissionEntry {
    pub id: String,
    pub roles: Vec<String>,
    pub entity_id: String,
    pub entity_type: EntityType,
    /// Only set by backups that predate entity IDs
    pub email: String,
    pub expiration: Option<String>,
}

/// The link part of a sharing link
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkShareLink {
    pub scope: String,
    #[serde(rename = "type")]
    pub link_type: String,
    pub web_url: String,
}

/// A principal a sharing link was shared with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkShareEntity {
    pub id: String,
    pub entity_type: EntityType,
}

/// A sharing link on an item at backup time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkShareEntry {
    pub id: String,
    pub link: LinkShareLink,
    pub roles: Vec<String>,
    pub entities: Vec<LinkShareEntity>,
    pub has_password: bool,
    pub expiration: Option<String>,
}

/// Contents of a `.meta` or `.dirmeta` entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemMetadata {
    pub file_name: String,
    pub sharing_mode: SharingMode,
    pub permissions: Vec<PermissionEntry>,
    pub link_shares: Vec<LinkShareEntry>,
}

impl ItemMetadata {
    /// Decodes a metadata entry. Empty input is the empty metadata.
    pub fn from_slice(name: &str, data: &[u8]) -> Result<Self, RestoreError> {
        if data.is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_slice(data).map_err(|e| RestoreError::Metadata {
            name: name.to_string(),
            message: e.to_string(),
        })
    }
}

/// Permissions present only in `after`, and those present only in `before`.
///
/// Two grants to the same principal with different roles are different
/// permissions.
pub fn diff_permissions(
    before: &[PermissionEntry],
    after: &[PermissionEntry],
) -> (Vec<PermissionEntry>, Vec<PermissionEntry>) {
    let added = after.iter().filter(|p| !before.contains(p)).cloned().collect();
    let removed = before.iter().filter(|p| !after.contains(p)).cloned().collect();
    (added, removed)
}

/// Link shares present only in `after`, and those present only in `before`.
///
/// Links are matched by URL. Links shared with nobody are ignored on both
/// sides.
pub fn diff_link_shares(
    before: &[LinkShareEntry],
    after: &[LinkShareEntry],
) -> (Vec<LinkShareEntry>, Vec<LinkShareEntry>) {
    let only_in = |xs: &[LinkShareEntry], ys: &[LinkShareEntry]| -> Vec<LinkShareEntry> {
        xs.iter()
            .filter(|x| !x.entities.is_empty())
            .filter(|x| {
                !ys.iter()
                    .any(|y| !y.entities.is_empty() && y.link.web_url == x.link.web_url)
            })
            .cloned()
            .collect()
    };

    (only_in(after, before), only_in(before, after))
}
