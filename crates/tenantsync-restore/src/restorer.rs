//! Drive restore orchestration
//!
//! [`DriveRestorer`] restores drive-backed collections into a destination
//! owner. Per collection it:
//!
//! 1. materializes the destination drive ([`DriveRestorer::ensure_drive_exists`])
//! 2. recreates the folder hierarchy ([`DriveRestorer::create_restore_folders`])
//! 3. indexes what already lives in the destination folder
//! 4. restores the folder's sharing, when permissions are included
//! 5. restores the items concurrently, resolving name collisions by policy
//!
//! Item failures are recoverable errors on the fault bus. Collection
//! failures stop that collection only, unless the bus policy is fail-fast.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use tenantsync_core::config::RestoreConfig;
use tenantsync_core::count::Counter;
use tenantsync_core::domain::version::{
    DIR_META_FILE_SUFFIX, ONE_DRIVE_1_DATA_AND_META_FILES, ONE_DRIVE_4_DIR_INCLUDES_PERMISSIONS,
    ONE_DRIVE_5_DIR_META_NO_NAME,
};
use tenantsync_core::domain::{CanonicalPath, DrivePath, OperationId, PathBuilder};
use tenantsync_core::fault::{FaultBus, LabeledError, RunStatus};
use tenantsync_core::ports::IDriveRestoreTarget;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::caches::RestoreCaches;
use crate::error::RestoreError;
use crate::item::ItemOutcome;
use crate::metadata::ItemMetadata;

/// Default number of items restored concurrently per collection
pub const DEFAULT_ITEM_PARALLELISM: usize = 4;

/// Drive name used when neither the backup nor the config names one
pub const DEFAULT_DRIVE_NAME: &str = "Restored Data";

// ============================================================================
// Inputs
// ============================================================================

/// One stored entry of a restore collection (`.data`, `.meta`, `.dirmeta`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItem {
    pub name: String,
    pub data: Vec<u8>,
}

impl StoredItem {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// The stored contents of one backed-up folder
#[derive(Debug, Clone)]
pub struct RestoreCollection {
    full_path: CanonicalPath,
    items: Vec<StoredItem>,
    index: HashMap<String, usize>,
}

impl RestoreCollection {
    pub fn new(full_path: CanonicalPath, items: Vec<StoredItem>) -> Self {
        let index = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.name.clone(), i))
            .collect();

        Self {
            full_path,
            items,
            index,
        }
    }

    /// Storage path of the folder
    #[must_use]
    pub fn full_path(&self) -> &CanonicalPath {
        &self.full_path
    }

    #[must_use]
    pub fn items(&self) -> &[StoredItem] {
        &self.items
    }

    /// Looks up a sibling entry by its storage name
    #[must_use]
    pub fn fetch(&self, name: &str) -> Option<&StoredItem> {
        self.index.get(name).map(|&i| &self.items[i])
    }
}

/// Per-run restore context
#[derive(Debug, Clone)]
pub struct RestoreContext {
    pub bus: Arc<FaultBus>,
    pub counter: Arc<Counter>,
    pub cancel: CancellationToken,
}

impl RestoreContext {
    pub fn new(bus: Arc<FaultBus>, counter: Arc<Counter>, cancel: CancellationToken) -> Self {
        Self {
            bus,
            counter,
            cancel,
        }
    }
}

/// Item and byte totals of a restore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionMetrics {
    /// Items attempted (skipped entries excluded)
    pub objects: u64,
    /// Bytes of attempted items
    pub bytes: u64,
    /// Items restored
    pub successes: u64,
}

impl CollectionMetrics {
    fn combine(&mut self, other: CollectionMetrics) {
        self.objects += other.objects;
        self.bytes += other.bytes;
        self.successes += other.successes;
    }
}

/// Result of restoring a set of collections
#[derive(Debug)]
pub struct RestoreOutcome {
    /// Identifier tagged on this run's log lines
    pub operation_id: OperationId,
    pub metrics: CollectionMetrics,
    pub status: RunStatus,
    pub failure: Option<LabeledError>,
}

// ============================================================================
// DriveRestorer
// ============================================================================

/// Restores drive-backed collections through an [`IDriveRestoreTarget`]
pub struct DriveRestorer {
    pub(crate) target: Arc<dyn IDriveRestoreTarget>,
    pub(crate) caches: Arc<RestoreCaches>,
    pub(crate) config: RestoreConfig,
    pub(crate) backup_version: i32,
    pub(crate) parallelism: usize,
}

impl std::fmt::Debug for DriveRestorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveRestorer")
            .field("config", &self.config)
            .field("backup_version", &self.backup_version)
            .field("parallelism", &self.parallelism)
            .finish_non_exhaustive()
    }
}

impl DriveRestorer {
    /// Creates a restorer for data written with `backup_version`.
    ///
    /// Rejects configurations that fail [`RestoreConfig::validate`].
    pub fn new(
        target: Arc<dyn IDriveRestoreTarget>,
        caches: Arc<RestoreCaches>,
        config: RestoreConfig,
        backup_version: i32,
    ) -> Result<Self, RestoreError> {
        if let Some(first) = config.validate().into_iter().next() {
            return Err(RestoreError::InvalidConfig(first.to_string()));
        }

        Ok(Self {
            target,
            caches,
            config,
            backup_version,
            parallelism: DEFAULT_ITEM_PARALLELISM,
        })
    }

    /// Sets how many items of a collection are restored at once
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    #[must_use]
    pub fn caches(&self) -> &Arc<RestoreCaches> {
        &self.caches
    }

    /// Seeds the drive caches from the destination owner's drives
    pub async fn populate(&self, owner: &str) -> Result<(), RestoreError> {
        self.caches.populate(self.target.as_ref(), owner).await
    }

    /// Name for drives that must be created and have no backup-time name
    fn fallback_drive_name(&self) -> &str {
        [self.config.drive.as_str(), self.config.location.as_str()]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or(DEFAULT_DRIVE_NAME)
    }

    /// Owner that receives the restored drives
    fn destination_owner<'a>(&'a self, path: &'a CanonicalPath) -> &'a str {
        if self.config.protected_resource.is_empty() {
            path.resource_owner()
        } else {
            &self.config.protected_resource
        }
    }

    /// Folder hierarchy, below the drive root, that a collection restores into
    pub(crate) fn restore_dir(&self, drive_path: &DrivePath) -> PathBuilder {
        let mut dir = PathBuilder::new();
        if !self.config.is_in_place() {
            dir = dir.append_all(self.config.location.split('/'));
        }
        dir.append_all(drive_path.folders.elements())
    }

    // ========================================================================
    // Collections
    // ========================================================================

    /// Restores collections one after the other.
    ///
    /// A failing collection is a recoverable error; a hard failure on the
    /// bus stops the remaining collections. The status is evaluated once, at
    /// the end.
    #[tracing::instrument(
        level = "info",
        skip_all,
        fields(collections = collections.len(), operation_id = tracing::field::Empty)
    )]
    pub async fn restore_collections(
        &self,
        ctx: &RestoreContext,
        collections: &[RestoreCollection],
    ) -> Result<RestoreOutcome, RestoreError> {
        let operation_id = OperationId::new();
        tracing::Span::current().record("operation_id", tracing::field::display(operation_id));

        let mut metrics = CollectionMetrics::default();

        for collection in collections {
            if ctx.bus.has_failure() {
                break;
            }

            match self.restore_collection(ctx, collection).await {
                Ok(m) => metrics.combine(m),
                Err(RestoreError::Cancelled) => return Err(RestoreError::Cancelled),
                Err(e) => {
                    warn!(path = %collection.full_path(), error = %e, "Collection restore failed");
                    ctx.bus.add_recoverable(
                        LabeledError::from_error(&e).with_label("restore_collection"),
                    );
                }
            }
        }

        let failure = ctx.bus.finalize();
        let status = ctx.bus.status();

        info!(
            objects = metrics.objects,
            successes = metrics.successes,
            status = ?status,
            "Restore finished"
        );

        Ok(RestoreOutcome {
            operation_id,
            metrics,
            status,
            failure,
        })
    }

    /// Restores a single collection
    #[tracing::instrument(level = "info", skip(self, ctx, collection), fields(path = %collection.full_path()))]
    pub async fn restore_collection(
        &self,
        ctx: &RestoreContext,
        collection: &RestoreCollection,
    ) -> Result<CollectionMetrics, RestoreError> {
        if ctx.cancel.is_cancelled() {
            return Err(RestoreError::Cancelled);
        }

        let mut drive_path = DrivePath::from_path(collection.full_path())?;

        let drive = self
            .ensure_drive_exists(
                ctx,
                &drive_path,
                self.destination_owner(collection.full_path()),
                self.fallback_drive_name(),
            )
            .await?;

        // the destination drive may differ from the backed-up one
        drive_path.drive_id = drive.id.clone();

        let restore_dir = self.restore_dir(&drive_path);
        debug!(drive_id = %drive.id, restore_dir = %restore_dir, "Restoring collection");

        let col_meta = self.collection_metadata(&drive_path, collection)?;

        let folder_id = self
            .create_restore_folders(ctx, &drive.id, &restore_dir)
            .await?;

        self.caches
            .populate_collision_keys(self.target.as_ref(), &drive.id, &folder_id)
            .await?;

        if self.config.include_permissions
            && self.backup_version >= ONE_DRIVE_1_DATA_AND_META_FILES
            && !drive_path.folders.is_empty()
        {
            self.restore_permissions(
                ctx,
                &drive.id,
                &folder_id,
                collection.full_path(),
                &col_meta,
            )
            .await?;
        }
        self.caches
            .set_parent_dir_meta(collection.full_path().to_string(), col_meta);

        Ok(self
            .restore_items(ctx, &drive.id, &folder_id, collection)
            .await)
    }

    async fn restore_items(
        &self,
        ctx: &RestoreContext,
        drive_id: &str,
        folder_id: &str,
        collection: &RestoreCollection,
    ) -> CollectionMetrics {
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let objects = AtomicU64::new(0);
        let bytes = AtomicU64::new(0);
        let successes = AtomicU64::new(0);

        let tasks = collection.items().iter().map(|item| {
            let semaphore = Arc::clone(&semaphore);
            let (objects, bytes, successes) = (&objects, &bytes, &successes);
            async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };

                if ctx.cancel.is_cancelled() || ctx.bus.has_failure() {
                    return;
                }

                let result = tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => return,
                    result = self.restore_item(ctx, drive_id, folder_id, collection, item) => result,
                };

                match result {
                    Ok(ItemOutcome::Restored(restored)) => {
                        objects.fetch_add(1, Ordering::Relaxed);
                        bytes.fetch_add(item.data.len() as u64, Ordering::Relaxed);
                        successes.fetch_add(1, Ordering::Relaxed);
                        debug!(item = %item.name, restored_id = %restored.id, "Item restored");
                    }
                    Ok(ItemOutcome::Skipped) => {
                        debug!(item = %item.name, "Did not restore item");
                    }
                    Err(e) => {
                        objects.fetch_add(1, Ordering::Relaxed);
                        bytes.fetch_add(item.data.len() as u64, Ordering::Relaxed);
                        warn!(item = %item.name, error = %e, "Item restore failed");
                        ctx.bus.add_recoverable(
                            LabeledError::from_error(&e).with_label("restore_item"),
                        );
                    }
                }
            }
        });

        join_all(tasks).await;

        CollectionMetrics {
            objects: objects.into_inner(),
            bytes: bytes.into_inner(),
            successes: successes.into_inner(),
        }
    }

    /// Metadata of the collection's own folder.
    ///
    /// Before v4 it was stored next to the folder, in the parent collection,
    /// and is found in the parent-dir cache. From v4 on it is an entry of the
    /// collection itself.
    fn collection_metadata(
        &self,
        drive_path: &DrivePath,
        collection: &RestoreCollection,
    ) -> Result<ItemMetadata, RestoreError> {
        if !self.config.include_permissions
            || self.backup_version < ONE_DRIVE_1_DATA_AND_META_FILES
            || drive_path.folders.is_empty()
        {
            return Ok(ItemMetadata::default());
        }

        if self.backup_version < ONE_DRIVE_4_DIR_INCLUDES_PERMISSIONS {
            return Ok(self
                .caches
                .parent_dir_meta(&collection.full_path().to_string())
                .unwrap_or_default());
        }

        let meta_name = if self.backup_version >= ONE_DRIVE_5_DIR_META_NO_NAME {
            DIR_META_FILE_SUFFIX.to_string()
        } else {
            let last = drive_path.folders.last_elem().unwrap_or_default();
            format!("{last}{DIR_META_FILE_SUFFIX}")
        };

        let entry = collection
            .fetch(&meta_name)
            .ok_or_else(|| RestoreError::Metadata {
                name: meta_name.clone(),
                message: "collection metadata not found".to_string(),
            })?;

        ItemMetadata::from_slice(&meta_name, &entry.data)
    }
}
