//! Shared fakes and helpers for backup integration tests

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tenantsync_backup::{BackupContext, CategoryHandler, GlobScope, Reconciler, ScopeMatcher};
use tenantsync_core::config::BackupConfig;
use tenantsync_core::count::Counter;
use tenantsync_core::domain::{
    Category, Container, ContainerId, DeltaPath, DeltaPaths, DeltaToken, ItemId,
};
use tenantsync_core::fault::{FailurePolicy, FaultBus};
use tenantsync_core::ports::{
    AddedAndRemoved, IContainerEnumerator, IItemFetcher, ItemQueryOptions, RemoteError,
};
use tokio_util::sync::CancellationToken;

pub const TENANT: &str = "tid";
pub const OWNER: &str = "grp";

pub fn cid(s: &str) -> ContainerId {
    ContainerId::new(s).unwrap()
}

pub fn iid(s: &str) -> ItemId {
    ItemId::new(s).unwrap()
}

pub fn ids(v: &[&str]) -> Vec<ItemId> {
    v.iter().map(|s| iid(s)).collect()
}

pub fn channel(id: &str, name: &str) -> Container {
    Container::new(cid(id), name)
}

pub fn channel_path(id: &str) -> String {
    format!("{TENANT}/groups/{OWNER}/channelMessages/{id}")
}

pub fn previous<S: AsRef<str>>(entries: &[(&str, Option<&str>, S)]) -> DeltaPaths {
    entries
        .iter()
        .map(|(id, delta, path)| {
            (
                cid(id),
                DeltaPath {
                    delta: delta.map(|d| DeltaToken::new(d).unwrap()),
                    path: path.as_ref().to_string(),
                },
            )
        })
        .collect()
}

// ============================================================================
// Fake enumerator
// ============================================================================

/// Scripted response for one container's item-ID query
#[derive(Debug, Clone)]
pub enum FakeItems {
    Found(AddedAndRemoved),
    NotFound,
    Fail(String),
}

/// One recorded `get_container_item_ids` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCall {
    pub container_id: String,
    pub prev_delta: Option<String>,
    pub use_delta: bool,
}

#[derive(Default)]
pub struct FakeEnumerator {
    containers: Mutex<HashMap<Category, Vec<Container>>>,
    items: Mutex<HashMap<String, FakeItems>>,
    failing_lists: Mutex<HashSet<Category>>,
    calls: Mutex<Vec<QueryCall>>,
}

impl FakeEnumerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(self, category: Category, container: Container) -> Self {
        self.containers
            .lock()
            .unwrap()
            .entry(category)
            .or_default()
            .push(container);
        self
    }

    pub fn with_items(self, id: &str, added: &[&str], removed: &[&str], token: Option<&str>) -> Self {
        self.items.lock().unwrap().insert(
            id.to_string(),
            FakeItems::Found(AddedAndRemoved {
                added: ids(added),
                removed: ids(removed),
                new_delta_token: token.map(|t| DeltaToken::new(t).unwrap()),
                reset: false,
            }),
        );
        self
    }

    pub fn with_response(self, id: &str, response: FakeItems) -> Self {
        self.items.lock().unwrap().insert(id.to_string(), response);
        self
    }

    pub fn with_failing_list(self, category: Category) -> Self {
        self.failing_lists.lock().unwrap().insert(category);
        self
    }

    pub fn calls(&self) -> Vec<QueryCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn containers(&self, category: Category) -> Vec<Container> {
        self.containers
            .lock()
            .unwrap()
            .get(&category)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl IContainerEnumerator for FakeEnumerator {
    async fn list_containers(
        &self,
        _owner: &str,
        category: Category,
    ) -> anyhow::Result<Vec<Container>> {
        if self.failing_lists.lock().unwrap().contains(&category) {
            return Err(RemoteError::ServerError("listing failed".to_string()).into());
        }
        Ok(self.containers(category))
    }

    async fn get_container_item_ids(
        &self,
        _owner: &str,
        _category: Category,
        container_id: &ContainerId,
        prev_delta: Option<&DeltaToken>,
        opts: ItemQueryOptions,
    ) -> anyhow::Result<AddedAndRemoved> {
        self.calls.lock().unwrap().push(QueryCall {
            container_id: container_id.to_string(),
            prev_delta: prev_delta.map(ToString::to_string),
            use_delta: opts.use_delta,
        });

        let response = self.items.lock().unwrap().get(container_id.as_str()).cloned();
        match response {
            Some(FakeItems::Found(found)) => Ok(found),
            Some(FakeItems::NotFound) => {
                Err(RemoteError::NotFound(container_id.to_string()).into())
            }
            Some(FakeItems::Fail(msg)) => Err(anyhow::anyhow!(msg)),
            None => Ok(AddedAndRemoved {
                new_delta_token: opts
                    .use_delta
                    .then(|| DeltaToken::new(format!("delta-{container_id}")).unwrap()),
                ..AddedAndRemoved::default()
            }),
        }
    }
}

// ============================================================================
// Fake item fetcher
// ============================================================================

#[derive(Default)]
pub struct FakeFetcher {
    data: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(self, id: &str, data: &[u8]) -> Self {
        self.data.lock().unwrap().insert(id.to_string(), data.to_vec());
        self
    }

    pub fn with_failing(self, id: &str) -> Self {
        self.failing.lock().unwrap().insert(id.to_string());
        self
    }
}

#[async_trait::async_trait]
impl IItemFetcher for FakeFetcher {
    async fn fetch_item(
        &self,
        _owner: &str,
        _category: Category,
        _container_id: &ContainerId,
        item_id: &ItemId,
    ) -> anyhow::Result<Vec<u8>> {
        if self.failing.lock().unwrap().contains(item_id.as_str()) {
            return Err(RemoteError::ServerError(format!("fetching {item_id}")).into());
        }
        self.data
            .lock()
            .unwrap()
            .get(item_id.as_str())
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(item_id.to_string()).into())
    }
}

// ============================================================================
// Context helpers
// ============================================================================

pub fn context(policy: FailurePolicy) -> BackupContext {
    let config = BackupConfig {
        failure_policy: policy,
        ..BackupConfig::default()
    };
    BackupContext::new(
        TENANT,
        OWNER,
        &config,
        FaultBus::new(policy),
        Counter::new(),
        CancellationToken::new(),
    )
}

pub fn reconciler(category: Category, enumerator: Arc<FakeEnumerator>) -> Reconciler {
    reconciler_with_scope(category, enumerator, Arc::new(GlobScope::all()))
}

pub fn reconciler_with_scope(
    category: Category,
    enumerator: Arc<FakeEnumerator>,
    scope: Arc<dyn ScopeMatcher>,
) -> Reconciler {
    Reconciler::new(
        CategoryHandler::for_category(category),
        enumerator as Arc<dyn IContainerEnumerator>,
        scope,
    )
}
