//! Metadata collections carried between backup runs
//!
//! Each category persists two flat JSON objects under its metadata path
//! (`tenant/<service>Metadata/owner/category`):
//!
//! - `previouspath`: container ID -> canonical path string
//! - `delta`: container ID -> delta token
//!
//! The next run reads them back with [`parse_metadata_collections`]. Corrupt
//! input never fails the run; it downgrades to a full backup instead.

use std::collections::{BTreeMap, HashMap, HashSet};

use tenantsync_core::domain::{
    Category, CategoryDeltaPaths, ContainerId, DeltaPath, DeltaPaths, DeltaToken,
    MetadataCollection, MetadataFile, PathBuilder, DELTA_URLS_FILE_NAME, PREVIOUS_PATH_FILE_NAME,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ReconcileError;

// ============================================================================
// Building
// ============================================================================

fn encode(entries: &BTreeMap<&str, &str>) -> Result<Vec<u8>, ReconcileError> {
    serde_json::to_vec(entries).map_err(|e| ReconcileError::Metadata(e.to_string()))
}

/// Serializes updated delta/path state into the category's metadata collection.
pub fn make_metadata_collection(
    tenant: &str,
    owner: &str,
    category: Category,
    updated: &DeltaPaths,
) -> Result<MetadataCollection, ReconcileError> {
    let full_path = PathBuilder::new()
        .to_service_category_metadata_path(tenant, owner, category.service(), category, false)
        .map_err(|e| ReconcileError::Metadata(format!("making metadata path prefix: {e}")))?;

    let paths: BTreeMap<&str, &str> = updated
        .iter()
        .filter(|(_, dp)| !dp.path.is_empty())
        .map(|(id, dp)| (id.as_str(), dp.path.as_str()))
        .collect();

    let deltas: BTreeMap<&str, &str> = updated
        .iter()
        .filter_map(|(id, dp)| dp.delta.as_ref().map(|d| (id.as_str(), d.as_str())))
        .collect();

    let files = vec![
        MetadataFile {
            name: PREVIOUS_PATH_FILE_NAME.to_string(),
            data: encode(&paths)?,
        },
        MetadataFile {
            name: DELTA_URLS_FILE_NAME.to_string(),
            data: encode(&deltas)?,
        },
    ];

    debug!(
        category = %category,
        paths = paths.len(),
        deltas = deltas.len(),
        "Built metadata collection"
    );

    MetadataCollection::new(full_path, files).map_err(|e| ReconcileError::Metadata(e.to_string()))
}

// ============================================================================
// Parsing
// ============================================================================

/// State recovered from the previous run's metadata collections
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMetadata {
    /// Per-category previous state, empty when incremental mode is disabled
    pub deltas: CategoryDeltaPaths,
    /// False when the previous metadata was unusable
    pub can_use_previous_backup: bool,
}

impl ParsedMetadata {
    fn full_backup() -> Self {
        Self {
            deltas: HashMap::new(),
            can_use_previous_backup: false,
        }
    }

    /// Previous state for one category (empty when unknown)
    #[must_use]
    pub fn for_category(&self, category: Category) -> DeltaPaths {
        self.deltas.get(&category).cloned().unwrap_or_default()
    }
}

/// Why a metadata input was rejected
enum Corrupt {
    Duplicate(&'static str),
    Decode(&'static str, serde_json::Error),
}

/// Reads previous delta tokens and paths back out of metadata collections.
///
/// A duplicate file for a category or an undecodable file makes the whole
/// input unusable: the result is empty with `can_use_previous_backup = false`.
/// Entries with a delta but no path are dropped. Cancellation is the only
/// error.
pub fn parse_metadata_collections(
    collections: &[MetadataCollection],
    cancel: &CancellationToken,
) -> Result<ParsedMetadata, ReconcileError> {
    match parse_inner(collections, cancel)? {
        Ok(mut deltas) => {
            for dps in deltas.values_mut() {
                dps.retain(|_, dp| !dp.path.is_empty());
            }

            info!(
                categories = deltas.len(),
                containers = deltas.values().map(HashMap::len).sum::<usize>(),
                "Parsed previous metadata"
            );

            Ok(ParsedMetadata {
                deltas,
                can_use_previous_backup: true,
            })
        }
        Err(Corrupt::Duplicate(file)) => {
            warn!(file, "Multiple versions of metadata file, running full backup");
            Ok(ParsedMetadata::full_backup())
        }
        Err(Corrupt::Decode(file, e)) => {
            warn!(file, error = %e, "Decoding metadata file, running full backup");
            Ok(ParsedMetadata::full_backup())
        }
    }
}

fn parse_inner(
    collections: &[MetadataCollection],
    cancel: &CancellationToken,
) -> Result<Result<CategoryDeltaPaths, Corrupt>, ReconcileError> {
    let mut deltas: CategoryDeltaPaths = HashMap::new();
    let mut seen: HashSet<(Category, &'static str)> = HashSet::new();

    for collection in collections {
        let category = collection.category();

        for file in collection.files() {
            if cancel.is_cancelled() {
                return Err(ReconcileError::Cancelled);
            }

            let name: &'static str = match file.name.as_str() {
                PREVIOUS_PATH_FILE_NAME => PREVIOUS_PATH_FILE_NAME,
                DELTA_URLS_FILE_NAME => DELTA_URLS_FILE_NAME,
                other => {
                    debug!(file = other, category = %category, "Ignoring unknown metadata file");
                    continue;
                }
            };

            if !seen.insert((category, name)) {
                return Ok(Err(Corrupt::Duplicate(name)));
            }

            let entries: BTreeMap<String, String> = match serde_json::from_slice(&file.data) {
                Ok(entries) => entries,
                Err(e) => return Ok(Err(Corrupt::Decode(name, e))),
            };

            let dps = deltas.entry(category).or_default();
            for (id, value) in entries {
                // Invalid IDs or tokens are dropped like any other unusable entry
                let Ok(id) = ContainerId::new(id) else {
                    continue;
                };
                let entry: &mut DeltaPath = dps.entry(id).or_default();
                if name == PREVIOUS_PATH_FILE_NAME {
                    entry.path = value;
                } else {
                    entry.delta = DeltaToken::new(value).ok();
                }
            }
        }
    }

    Ok(Ok(deltas))
}
