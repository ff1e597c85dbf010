//! Shared fakes and helpers for restore integration tests

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tenantsync_core::config::RestoreConfig;
use tenantsync_core::count::Counter;
use tenantsync_core::domain::version::BACKUP;
use tenantsync_core::domain::{CanonicalPath, CollisionPolicy};
use tenantsync_core::fault::{FailurePolicy, FaultBus};
use tenantsync_core::ports::{
    DriveDescriptor, DriveItemInfo, IDriveRestoreTarget, LinkShareGrant, NewDriveItem,
    PermissionGrant, Recipient, RemoteError,
};
use tenantsync_restore::{DriveRestorer, RestoreCaches, RestoreContext};
use tokio_util::sync::CancellationToken;

pub const OWNER: &str = "user";

/// Storage path of a folder below the root of `drive_id`
pub fn drive_folder(drive_id: &str, rel: &str) -> CanonicalPath {
    let s = if rel.is_empty() {
        format!("tid/onedrive/{OWNER}/files/drives/{drive_id}/root:")
    } else {
        format!("tid/onedrive/{OWNER}/files/drives/{drive_id}/root:/{rel}")
    };
    CanonicalPath::from_data_layer_path(&s, false).unwrap()
}

pub fn context(policy: FailurePolicy) -> RestoreContext {
    RestoreContext::new(FaultBus::new(policy), Counter::new(), CancellationToken::new())
}

pub fn config(on_collision: CollisionPolicy) -> RestoreConfig {
    RestoreConfig {
        on_collision,
        ..RestoreConfig::default()
    }
}

pub fn restorer(
    target: &Arc<FakeTarget>,
    caches: &Arc<RestoreCaches>,
    config: RestoreConfig,
) -> DriveRestorer {
    restorer_at(target, caches, config, BACKUP)
}

pub fn restorer_at(
    target: &Arc<FakeTarget>,
    caches: &Arc<RestoreCaches>,
    config: RestoreConfig,
    version: i32,
) -> DriveRestorer {
    DriveRestorer::new(
        Arc::clone(target) as Arc<dyn IDriveRestoreTarget>,
        Arc::clone(caches),
        config,
        version,
    )
    .unwrap()
}

// ============================================================================
// Fake restore target
// ============================================================================

/// One recorded port call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListDrives,
    GetRootFolder(String),
    PostDrive(String),
    PostItem {
        parent_id: String,
        name: String,
        is_folder: bool,
        policy: CollisionPolicy,
    },
    Delete(String),
    ListChildren(String),
    PostPermission {
        item_id: String,
        grant: PermissionGrant,
    },
    PostLinkShare {
        item_id: String,
        link: LinkShareGrant,
    },
    DeletePermission {
        item_id: String,
        permission_id: String,
    },
}

#[derive(Debug, Clone)]
struct Node {
    info: DriveItemInfo,
    parent_id: String,
    content: Vec<u8>,
}

/// In-memory drive service.
///
/// Drive roots are `<driveID>-root`. Posts follow the service's collision
/// rules: `Replace` on a folder returns the existing folder and conflicts
/// with a file, `Copy` appends ` 1`, ` 2`, ... until the name is free.
#[derive(Default)]
pub struct FakeTarget {
    calls: Mutex<Vec<Call>>,
    drives: Mutex<Vec<DriveDescriptor>>,
    reserved_drive_names: Mutex<HashSet<String>>,
    nodes: Mutex<HashMap<String, Node>>,
    next_id: Mutex<u32>,
    fail_list_drives: Mutex<bool>,
    fail_post_drive: Mutex<bool>,
    fail_names: Mutex<HashSet<String>>,
    vanished: Mutex<HashSet<String>>,
    unresolved: Mutex<HashSet<String>>,
    fail_permissions: Mutex<bool>,
}

impl FakeTarget {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_drive(self: Arc<Self>, id: &str, name: &str) -> Arc<Self> {
        self.drives.lock().unwrap().push(DriveDescriptor {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    /// Drive names the service refuses as already taken
    pub fn with_reserved_drive_name(self: Arc<Self>, name: &str) -> Arc<Self> {
        self.reserved_drive_names
            .lock()
            .unwrap()
            .insert(name.into());
        self
    }

    pub fn with_failing_list(self: Arc<Self>) -> Arc<Self> {
        *self.fail_list_drives.lock().unwrap() = true;
        self
    }

    pub fn with_failing_post_drive(self: Arc<Self>) -> Arc<Self> {
        *self.fail_post_drive.lock().unwrap() = true;
        self
    }

    /// Posts of items with this name fail with a server error
    pub fn with_failing_name(self: Arc<Self>, name: &str) -> Arc<Self> {
        self.fail_names.lock().unwrap().insert(name.into());
        self
    }

    /// Grants and links naming this recipient fail as unresolvable
    pub fn with_unresolved_recipient(self: Arc<Self>, id: &str) -> Arc<Self> {
        self.unresolved.lock().unwrap().insert(id.into());
        self
    }

    /// Permission posts fail with a server error
    pub fn with_failing_permissions(self: Arc<Self>) -> Arc<Self> {
        *self.fail_permissions.lock().unwrap() = true;
        self
    }

    /// Adds an existing item and returns its ID
    pub fn seed(&self, parent_id: &str, name: &str, is_folder: bool) -> String {
        let id = self.next_id("seed");
        self.nodes.lock().unwrap().insert(
            id.clone(),
            Node {
                info: DriveItemInfo {
                    id: id.clone(),
                    name: name.into(),
                    is_folder,
                },
                parent_id: parent_id.into(),
                content: Vec::new(),
            },
        );
        id
    }

    /// Removes an item behind the engine's back
    pub fn vanish(&self, item_id: &str) {
        self.nodes.lock().unwrap().remove(item_id);
        self.vanished.lock().unwrap().insert(item_id.into());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// File and folder posts, as `(name, is_folder, policy)`
    pub fn posts(&self) -> Vec<(String, bool, CollisionPolicy)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::PostItem {
                    name,
                    is_folder,
                    policy,
                    ..
                } => Some((name, is_folder, policy)),
                _ => None,
            })
            .collect()
    }

    pub fn post_drives(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::PostDrive(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Invitations, as `(item_id, grant)`
    pub fn permission_posts(&self) -> Vec<(String, PermissionGrant)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::PostPermission { item_id, grant } => Some((item_id, grant)),
                _ => None,
            })
            .collect()
    }

    /// Sharing links, as `(item_id, link)`
    pub fn link_posts(&self) -> Vec<(String, LinkShareGrant)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::PostLinkShare { item_id, link } => Some((item_id, link)),
                _ => None,
            })
            .collect()
    }

    /// Permission deletes, as `(item_id, permission_id)`
    pub fn permission_deletes(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::DeletePermission {
                    item_id,
                    permission_id,
                } => Some((item_id, permission_id)),
                _ => None,
            })
            .collect()
    }

    /// Current children of a folder, sorted by name
    pub fn children(&self, parent_id: &str) -> Vec<DriveItemInfo> {
        let mut children: Vec<_> = self
            .nodes
            .lock()
            .unwrap()
            .values()
            .filter(|n| n.parent_id == parent_id)
            .map(|n| n.info.clone())
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        children
    }

    pub fn content(&self, item_id: &str) -> Option<Vec<u8>> {
        self.nodes
            .lock()
            .unwrap()
            .get(item_id)
            .map(|n| n.content.clone())
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("{prefix}-{next}")
    }

    fn child_named(&self, parent_id: &str, name: &str) -> Option<DriveItemInfo> {
        self.nodes
            .lock()
            .unwrap()
            .values()
            .find(|n| n.parent_id == parent_id && n.info.name.eq_ignore_ascii_case(name))
            .map(|n| n.info.clone())
    }

    fn insert(&self, parent_id: &str, item: NewDriveItem, name: String) -> DriveItemInfo {
        let info = DriveItemInfo {
            id: self.next_id("item"),
            name,
            is_folder: item.is_folder,
        };
        self.nodes.lock().unwrap().insert(
            info.id.clone(),
            Node {
                info: info.clone(),
                parent_id: parent_id.into(),
                content: item.content,
            },
        );
        info
    }
}

#[async_trait::async_trait]
impl IDriveRestoreTarget for FakeTarget {
    async fn list_drives(&self, _owner: &str) -> anyhow::Result<Vec<DriveDescriptor>> {
        self.record(Call::ListDrives);
        if *self.fail_list_drives.lock().unwrap() {
            return Err(RemoteError::ServerError("drive pager".into()).into());
        }
        Ok(self.drives.lock().unwrap().clone())
    }

    async fn get_root_folder(&self, drive_id: &str) -> anyhow::Result<DriveItemInfo> {
        self.record(Call::GetRootFolder(drive_id.into()));
        Ok(DriveItemInfo {
            id: format!("{drive_id}-root"),
            name: "root".into(),
            is_folder: true,
        })
    }

    async fn post_drive(&self, _owner: &str, name: &str) -> anyhow::Result<DriveDescriptor> {
        self.record(Call::PostDrive(name.into()));
        if *self.fail_post_drive.lock().unwrap() {
            return Err(RemoteError::ServerError("quota".into()).into());
        }

        let taken = self.reserved_drive_names.lock().unwrap().contains(name)
            || self.drives.lock().unwrap().iter().any(|d| d.name == name);
        if taken {
            return Err(RemoteError::AlreadyExists(name.into()).into());
        }

        let drive = DriveDescriptor {
            id: self.next_id("drive"),
            name: name.into(),
        };
        self.drives.lock().unwrap().push(drive.clone());
        Ok(drive)
    }

    async fn post_item_in_container(
        &self,
        _drive_id: &str,
        parent_folder_id: &str,
        item: NewDriveItem,
        on_collision: CollisionPolicy,
    ) -> anyhow::Result<DriveItemInfo> {
        self.record(Call::PostItem {
            parent_id: parent_folder_id.into(),
            name: item.name.clone(),
            is_folder: item.is_folder,
            policy: on_collision,
        });

        if self.fail_names.lock().unwrap().contains(&item.name) {
            return Err(RemoteError::ServerError(format!("posting {}", item.name)).into());
        }

        let existing = self.child_named(parent_folder_id, &item.name);
        match (existing, on_collision) {
            (None, _) => {
                let name = item.name.clone();
                Ok(self.insert(parent_folder_id, item, name))
            }
            (Some(found), CollisionPolicy::Replace) if found.is_folder && item.is_folder => {
                Ok(found)
            }
            (Some(_), CollisionPolicy::Copy) => {
                let mut i = 1;
                let name = loop {
                    let candidate = format!("{} {i}", item.name);
                    if self.child_named(parent_folder_id, &candidate).is_none() {
                        break candidate;
                    }
                    i += 1;
                };
                Ok(self.insert(parent_folder_id, item, name))
            }
            (Some(_), _) => Err(RemoteError::AlreadyExists(item.name).into()),
        }
    }

    async fn delete_item(&self, _drive_id: &str, item_id: &str) -> anyhow::Result<()> {
        self.record(Call::Delete(item_id.into()));
        if self.vanished.lock().unwrap().contains(item_id) {
            return Err(RemoteError::NotFound(item_id.into()).into());
        }
        match self.nodes.lock().unwrap().remove(item_id) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(item_id.into()).into()),
        }
    }

    async fn get_items_in_container(
        &self,
        _drive_id: &str,
        folder_id: &str,
    ) -> anyhow::Result<Vec<DriveItemInfo>> {
        self.record(Call::ListChildren(folder_id.into()));
        Ok(self.children(folder_id))
    }

    async fn post_item_permission(
        &self,
        _drive_id: &str,
        item_id: &str,
        grant: PermissionGrant,
    ) -> anyhow::Result<String> {
        self.record(Call::PostPermission {
            item_id: item_id.into(),
            grant: grant.clone(),
        });

        if *self.fail_permissions.lock().unwrap() {
            return Err(RemoteError::ServerError("invite".into()).into());
        }
        if let Recipient::ObjectId(id) = &grant.recipient {
            if self.unresolved.lock().unwrap().contains(id) {
                return Err(RemoteError::UnresolvedRecipients(id.clone()).into());
            }
        }
        Ok(self.next_id("perm"))
    }

    async fn post_item_link_share(
        &self,
        _drive_id: &str,
        item_id: &str,
        link: LinkShareGrant,
    ) -> anyhow::Result<String> {
        self.record(Call::PostLinkShare {
            item_id: item_id.into(),
            link: link.clone(),
        });

        let unresolved = {
            let names = self.unresolved.lock().unwrap();
            link.recipients.iter().find(|r| names.contains(*r)).cloned()
        };
        if let Some(id) = unresolved {
            return Err(RemoteError::UnresolvedRecipients(id).into());
        }
        Ok(self.next_id("link"))
    }

    async fn delete_item_permission(
        &self,
        _drive_id: &str,
        item_id: &str,
        permission_id: &str,
    ) -> anyhow::Result<()> {
        self.record(Call::DeletePermission {
            item_id: item_id.into(),
            permission_id: permission_id.into(),
        });
        Ok(())
    }
}
