//! Counter bus for run observability
//!
//! Counters are plain named integers. A [`Counter`] created with
//! [`Counter::local`] rolls every increment up into its parent, so a
//! per-category counter and the run-level counter stay consistent without
//! a merge step.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use dashmap::DashMap;

/// Named counters exposed by backup and restore runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CounterKey {
    // restore
    NewItemCreated,
    CollisionSkip,
    CollisionReplace,
    NewDriveCreated,
    NewFolderCreated,
    // backup reconciliation
    ItemsAdded,
    ItemsRemoved,
    SkippedContainers,
    BadPrevPath,
    BadCollPath,
    CollectionTombstoneConflict,
    PrevDeltas,
    PrevPaths,
    NewDeltas,
    NewPrevPaths,
    MissingDelta,
    Collections,
    // item streaming
    StreamItemsAdded,
    StreamItemsRemoved,
    StreamItemsDeletedInFlight,
    StreamItemsErred,
}

impl CounterKey {
    /// Every key, in declaration order
    pub const ALL: [CounterKey; 21] = [
        Self::NewItemCreated,
        Self::CollisionSkip,
        Self::CollisionReplace,
        Self::NewDriveCreated,
        Self::NewFolderCreated,
        Self::ItemsAdded,
        Self::ItemsRemoved,
        Self::SkippedContainers,
        Self::BadPrevPath,
        Self::BadCollPath,
        Self::CollectionTombstoneConflict,
        Self::PrevDeltas,
        Self::PrevPaths,
        Self::NewDeltas,
        Self::NewPrevPaths,
        Self::MissingDelta,
        Self::Collections,
        Self::StreamItemsAdded,
        Self::StreamItemsRemoved,
        Self::StreamItemsDeletedInFlight,
        Self::StreamItemsErred,
    ];

    /// snake_case name, also used as an error label
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewItemCreated => "new_item_created",
            Self::CollisionSkip => "collision_skip",
            Self::CollisionReplace => "collision_replace",
            Self::NewDriveCreated => "new_drive_created",
            Self::NewFolderCreated => "new_folder_created",
            Self::ItemsAdded => "items_added",
            Self::ItemsRemoved => "items_removed",
            Self::SkippedContainers => "skipped_containers",
            Self::BadPrevPath => "bad_prev_path",
            Self::BadCollPath => "bad_coll_path",
            Self::CollectionTombstoneConflict => "collection_tombstone_conflict",
            Self::PrevDeltas => "prev_deltas",
            Self::PrevPaths => "prev_paths",
            Self::NewDeltas => "new_deltas",
            Self::NewPrevPaths => "new_prev_paths",
            Self::MissingDelta => "missing_delta",
            Self::Collections => "collections",
            Self::StreamItemsAdded => "stream_items_added",
            Self::StreamItemsRemoved => "stream_items_removed",
            Self::StreamItemsDeletedInFlight => "stream_items_deleted_in_flight",
            Self::StreamItemsErred => "stream_items_erred",
        }
    }
}

impl Display for CounterKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Concurrent counter set
#[derive(Debug, Default)]
pub struct Counter {
    values: DashMap<CounterKey, i64>,
    parent: Option<Arc<Counter>>,
}

impl Counter {
    /// Creates a root counter
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a child that rolls increments up into this counter
    pub fn local(self: &Arc<Self>) -> Arc<Self> {
        Arc::new(Self {
            values: DashMap::new(),
            parent: Some(Arc::clone(self)),
        })
    }

    /// Adds one
    pub fn inc(&self, key: CounterKey) -> i64 {
        self.add(key, 1)
    }

    /// Adds `n` and returns the new local value
    pub fn add(&self, key: CounterKey, n: i64) -> i64 {
        let value = {
            let mut entry = self.values.entry(key).or_insert(0);
            *entry += n;
            *entry
        };

        if let Some(parent) = &self.parent {
            parent.add(key, n);
        }

        value
    }

    /// Current local value (zero if never touched)
    #[must_use]
    pub fn get(&self, key: CounterKey) -> i64 {
        self.values.get(&key).map(|v| *v).unwrap_or(0)
    }

    /// Snapshot of all non-zero counters, keyed by name
    #[must_use]
    pub fn values(&self) -> BTreeMap<&'static str, i64> {
        self.values
            .iter()
            .filter(|r| *r.value() != 0)
            .map(|r| (r.key().as_str(), *r.value()))
            .collect()
    }
}
