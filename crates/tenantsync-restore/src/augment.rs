//! Restore path augmentation
//!
//! A restore selection names files. Restoring them also needs the folders
//! above them, and those folders are materialized from their `.dirmeta`
//! entries. [`augment_restore_paths`] adds one directory metadata entry per
//! ancestor folder and sorts the result, so every folder's marker precedes
//! the entries below it.

use std::collections::BTreeMap;

use tenantsync_core::domain::version::{
    DIR_META_FILE_SUFFIX, ONE_DRIVE_1_DATA_AND_META_FILES, ONE_DRIVE_4_DIR_INCLUDES_PERMISSIONS,
    ONE_DRIVE_6_NAME_IN_META,
};
use tenantsync_core::domain::{CanonicalPath, DrivePath};

use crate::error::RestoreError;

/// Where an entry is stored, and the folder it restores into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestorePaths {
    pub storage_path: CanonicalPath,
    pub restore_path: CanonicalPath,
}

/// Adds the directory metadata entries every folder of `paths` needs.
///
/// The marker's storage location depends on the backup format:
/// - v6+: `<dir>/.dirmeta`, restoring into the folder
/// - v4, v5: `<dir>/<dir name>.dirmeta`, restoring into the folder
/// - v1 to v3: `<parent>/<dir name>.dirmeta`, restoring into the parent
/// - v0: no markers
///
/// Ancestors are added up to, not including, the drive root. Fails when a
/// restore path is shorter than its storage folder.
pub fn augment_restore_paths(
    backup_version: i32,
    paths: Vec<RestorePaths>,
) -> Result<Vec<RestorePaths>, RestoreError> {
    // keyed by the folder's storage path
    let mut folders: BTreeMap<String, RestorePaths> = BTreeMap::new();

    for p in &paths {
        let mut current = p.clone();
        let mut first = true;

        loop {
            let storage_dir = current.storage_path.dir()?;
            if DrivePath::from_path(&storage_dir)?.folders.is_empty() {
                break;
            }

            if current.restore_path.elements().len() < storage_dir.elements().len() {
                return Err(RestoreError::RestorePathTooShort {
                    restore_path: current.restore_path.to_string(),
                    storage_path: storage_dir.to_string(),
                });
            }

            // the first restore path already points at the item's folder
            let restore_dir = if first {
                current.restore_path.clone()
            } else {
                current.restore_path.dir()?
            };

            current = RestorePaths {
                storage_path: storage_dir,
                restore_path: restore_dir,
            };
            folders.insert(current.storage_path.to_string(), current.clone());
            first = false;
        }
    }

    let mut keyed: Vec<(OrderKey, RestorePaths)> = paths
        .into_iter()
        .map(|p| (OrderKey::entry(&p.storage_path), p))
        .collect();

    if backup_version >= ONE_DRIVE_1_DATA_AND_META_FILES {
        for folder in folders.into_values() {
            let key = OrderKey::marker(&folder.storage_path);
            keyed.push((key, dir_meta_marker(backup_version, folder)?));
        }
    }

    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(keyed.into_iter().map(|(_, p)| p).collect())
}

/// Output order: grouped by the folder an entry belongs to, parents before
/// children, each group's marker first, then entries by name.
///
/// A marker belongs to the folder it describes, wherever it is stored, so a
/// v1-v5 marker never sorts after that folder's contents.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    folder: Vec<String>,
    rank: u8,
    name: String,
}

impl OrderKey {
    fn entry(storage_path: &CanonicalPath) -> Self {
        let mut folder = storage_path.elements();
        let name = folder.pop().unwrap_or_default();
        Self {
            folder,
            rank: 1,
            name,
        }
    }

    fn marker(folder_path: &CanonicalPath) -> Self {
        Self {
            folder: folder_path.elements(),
            rank: 0,
            name: String::new(),
        }
    }
}

fn dir_meta_marker(backup_version: i32, folder: RestorePaths) -> Result<RestorePaths, RestoreError> {
    let name = folder
        .storage_path
        .elements()
        .last()
        .cloned()
        .unwrap_or_default();

    let marker = if backup_version >= ONE_DRIVE_6_NAME_IN_META {
        RestorePaths {
            storage_path: folder.storage_path.append(DIR_META_FILE_SUFFIX, true)?,
            restore_path: folder.restore_path,
        }
    } else if backup_version >= ONE_DRIVE_4_DIR_INCLUDES_PERMISSIONS {
        RestorePaths {
            storage_path: folder
                .storage_path
                .append(&format!("{name}{DIR_META_FILE_SUFFIX}"), true)?,
            restore_path: folder.restore_path,
        }
    } else {
        RestorePaths {
            storage_path: folder
                .storage_path
                .dir()?
                .append(&format!("{name}{DIR_META_FILE_SUFFIX}"), true)?,
            restore_path: folder.restore_path.dir()?,
        }
    };

    Ok(marker)
}
