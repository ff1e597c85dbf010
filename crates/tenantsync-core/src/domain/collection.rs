//! Backup collections and the per-container state carried between runs
//!
//! A [`Collection`] groups the item changes found in one container during a
//! backup run. Its lifecycle [`CollectionState`] is derived purely from the
//! previous and current canonical paths, so it never drifts from them.

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ContainerId, DeltaToken, ItemId};
use super::path::{CanonicalPath, Category, PathBuilder};

// ============================================================================
// CollectionState
// ============================================================================

/// Lifecycle state of a collection relative to the previous backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionState {
    /// No previous path: the container is new since the last backup
    New,
    /// Previous and current paths are equal
    NotMoved,
    /// Previous and current paths differ (rename or move)
    Moved,
    /// No current path: the container is gone (tombstone)
    Deleted,
}

impl CollectionState {
    /// Derives the state from the previous and current paths.
    #[must_use]
    pub fn of(previous: Option<&CanonicalPath>, current: Option<&CanonicalPath>) -> Self {
        match (previous, current) {
            (_, None) => Self::Deleted,
            (None, Some(_)) => Self::New,
            (Some(prev), Some(curr)) if prev.to_string() == curr.to_string() => Self::NotMoved,
            (Some(_), Some(_)) => Self::Moved,
        }
    }
}

impl Display for CollectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::NotMoved => "not_moved",
            Self::Moved => "moved",
            Self::Deleted => "deleted",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Collection
// ============================================================================

/// Item changes for one container, immutable once constructed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    full_path: Option<CanonicalPath>,
    previous_path: Option<CanonicalPath>,
    location_path: Option<PathBuilder>,
    category: Category,
    state: CollectionState,
    added: HashSet<ItemId>,
    removed: HashSet<ItemId>,
    do_not_merge: bool,
}

impl Collection {
    /// Creates a collection for a live container.
    ///
    /// Any ID present in both `added` and `removed` is kept only in
    /// `removed`: an item that was deleted and recreated comes back under a
    /// new ID, so the old one must not also be fetched.
    pub fn new(
        full_path: CanonicalPath,
        previous_path: Option<CanonicalPath>,
        location_path: Option<PathBuilder>,
        added: impl IntoIterator<Item = ItemId>,
        removed: impl IntoIterator<Item = ItemId>,
        do_not_merge: bool,
    ) -> Self {
        let removed: HashSet<ItemId> = removed.into_iter().collect();
        let added: HashSet<ItemId> = added
            .into_iter()
            .filter(|id| !removed.contains(id))
            .collect();

        let state = CollectionState::of(previous_path.as_ref(), Some(&full_path));

        Self {
            category: full_path.category(),
            full_path: Some(full_path),
            previous_path,
            location_path,
            state,
            added,
            removed,
            do_not_merge,
        }
    }

    /// Creates a Deleted-state collection with no items.
    #[must_use]
    pub fn tombstone(previous_path: CanonicalPath) -> Self {
        Self {
            category: previous_path.category(),
            full_path: None,
            previous_path: Some(previous_path),
            location_path: None,
            state: CollectionState::Deleted,
            added: HashSet::new(),
            removed: HashSet::new(),
            do_not_merge: false,
        }
    }

    /// Current canonical path, absent for tombstones
    #[must_use]
    pub fn full_path(&self) -> Option<&CanonicalPath> {
        self.full_path.as_ref()
    }

    /// Canonical path recorded by the previous backup
    #[must_use]
    pub fn previous_path(&self) -> Option<&CanonicalPath> {
        self.previous_path.as_ref()
    }

    /// Human-readable location (display names rather than IDs)
    #[must_use]
    pub fn location_path(&self) -> Option<&PathBuilder> {
        self.location_path.as_ref()
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    #[must_use]
    pub fn state(&self) -> CollectionState {
        self.state
    }

    #[must_use]
    pub fn added(&self) -> &HashSet<ItemId> {
        &self.added
    }

    #[must_use]
    pub fn removed(&self) -> &HashSet<ItemId> {
        &self.removed
    }

    /// When set, the store must not merge this collection with prior
    /// snapshot contents (the delta was reset).
    #[must_use]
    pub fn do_not_merge(&self) -> bool {
        self.do_not_merge
    }
}

// ============================================================================
// Metadata collection
// ============================================================================

/// File name holding container ID -> previous path entries
pub const PREVIOUS_PATH_FILE_NAME: &str = "previouspath";
/// File name holding container ID -> delta token entries
pub const DELTA_URLS_FILE_NAME: &str = "delta";

/// A single serialized file inside a metadata collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFile {
    pub name: String,
    pub data: Vec<u8>,
}

/// The persisted per-category state handed to the next backup run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataCollection {
    full_path: CanonicalPath,
    files: Vec<MetadataFile>,
}

impl MetadataCollection {
    /// Creates a metadata collection rooted at a metadata-service path.
    pub fn new(full_path: CanonicalPath, files: Vec<MetadataFile>) -> Result<Self, DomainError> {
        if !full_path.service().is_metadata() {
            return Err(DomainError::InvalidPath(format!(
                "metadata collection requires a metadata service path, got {full_path}"
            )));
        }

        Ok(Self { full_path, files })
    }

    #[must_use]
    pub fn full_path(&self) -> &CanonicalPath {
        &self.full_path
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.full_path.category()
    }

    #[must_use]
    pub fn files(&self) -> &[MetadataFile] {
        &self.files
    }

    /// Looks up a file by name
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&MetadataFile> {
        self.files.iter().find(|f| f.name == name)
    }
}

// ============================================================================
// Delta paths
// ============================================================================

/// Previous-run state for one container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaPath {
    /// Continuation token, absent when the container must be fully enumerated
    pub delta: Option<DeltaToken>,
    /// Serialized canonical path, empty when never durably recorded
    pub path: String,
}

/// Container ID -> previous state, for one category
pub type DeltaPaths = HashMap<ContainerId, DeltaPath>;

/// Category -> per-container previous state
pub type CategoryDeltaPaths = HashMap<Category, DeltaPaths>;
