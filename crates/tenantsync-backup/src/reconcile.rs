//! Reconciliation engine
//!
//! Merges the previous run's delta/path state for one category with the
//! current enumeration, producing one [`Collection`] per live container, a
//! tombstone per vanished container, and the updated state for the next run.
//!
//! ## Phases
//!
//! 1. Sequential walk over enumerated containers: tombstone removal, path
//!    resolution, scope check, previous-path parsing.
//! 2. Concurrent item-ID queries, bounded by a semaphore.
//! 3. Sequential merge of query results, then tombstones, then the metadata
//!    collection.
//!
//! All reconciliation state is owned by the calling task; only the remote
//! queries run concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tenantsync_core::config::BackupConfig;
use tenantsync_core::count::{Counter, CounterKey};
use tenantsync_core::domain::{
    CanonicalPath, Collection, Container, ContainerId, DeltaPath, DeltaPaths, DeltaToken,
    MetadataCollection,
};
use tenantsync_core::fault::{FaultBus, LabeledError, LABEL_FORCE_NO_BACKUP_CREATION};
use tenantsync_core::ports::{is_not_found, AddedAndRemoved, IContainerEnumerator, ItemQueryOptions};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::handler::CategoryHandler;
use crate::metadata::make_metadata_collection;
use crate::resolver::{ContainerResolver, ResolvedPaths};
use crate::scope::ScopeMatcher;
use crate::ReconcileError;

// ============================================================================
// Context
// ============================================================================

/// Per-category run context shared by the engine and its collections
#[derive(Debug, Clone)]
pub struct BackupContext {
    /// Tenant ID, the first canonical path element
    pub tenant: String,
    /// Resource owner (user, group, or site)
    pub owner: String,
    /// Maximum concurrent remote queries
    pub parallelism: usize,
    /// Capacity of each collection's item channel
    pub buffer_size: usize,
    /// Run-wide delta toggle
    pub delta_enabled: bool,
    pub bus: Arc<FaultBus>,
    pub counter: Arc<Counter>,
    pub cancel: CancellationToken,
}

impl BackupContext {
    pub fn new(
        tenant: impl Into<String>,
        owner: impl Into<String>,
        config: &BackupConfig,
        bus: Arc<FaultBus>,
        counter: Arc<Counter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            owner: owner.into(),
            parallelism: config.item_fetch_parallelism.max(1),
            buffer_size: config.collection_buffer_size.max(1),
            delta_enabled: config.delta_enabled,
            bus,
            counter,
            cancel,
        }
    }

    /// Child context with its own local fault bus and counter
    #[must_use]
    pub fn local(&self) -> Self {
        Self {
            bus: self.bus.local(),
            counter: self.counter.local(),
            ..self.clone()
        }
    }
}

// ============================================================================
// Output
// ============================================================================

/// Result of reconciling one category
#[derive(Debug, Clone)]
pub struct ReconcileOutput {
    /// Live collections and tombstones, keyed by container ID
    pub collections: HashMap<ContainerId, Collection>,
    /// State to persist for the next run
    pub updated: DeltaPaths,
    /// The serialized form of `updated`
    pub metadata: MetadataCollection,
}

impl ReconcileOutput {
    /// Number of collections including the metadata collection
    #[must_use]
    pub fn total_collections(&self) -> usize {
        self.collections.len() + 1
    }
}

// ============================================================================
// Engine
// ============================================================================

/// One container queued for an item-ID query
struct Query {
    container: Container,
    resolved: ResolvedPaths,
    prev_path: Option<CanonicalPath>,
    prev_delta: Option<DeltaToken>,
    use_delta: bool,
}

/// Reconciliation engine for one category
pub struct Reconciler {
    handler: CategoryHandler,
    enumerator: Arc<dyn IContainerEnumerator>,
    scope: Arc<dyn ScopeMatcher>,
}

impl Reconciler {
    pub fn new(
        handler: CategoryHandler,
        enumerator: Arc<dyn IContainerEnumerator>,
        scope: Arc<dyn ScopeMatcher>,
    ) -> Self {
        Self {
            handler,
            enumerator,
            scope,
        }
    }

    #[must_use]
    pub fn handler(&self) -> CategoryHandler {
        self.handler
    }

    /// Reconciles `previous` against the current `containers`.
    ///
    /// Per-container errors are recorded on `ctx.bus` and the container is
    /// skipped. Under fail-fast the first such error aborts with
    /// [`ReconcileError::Failed`].
    #[tracing::instrument(
        level = "info",
        skip(self, ctx, previous, containers),
        fields(category = %self.handler.category(), owner = %ctx.owner)
    )]
    pub async fn reconcile(
        &self,
        ctx: &BackupContext,
        previous: DeltaPaths,
        containers: Vec<Container>,
    ) -> Result<ReconcileOutput, ReconcileError> {
        let counter = &ctx.counter;
        let bus = &ctx.bus;

        counter.add(
            CounterKey::PrevDeltas,
            previous.values().filter(|dp| dp.delta.is_some()).count() as i64,
        );
        counter.add(
            CounterKey::PrevPaths,
            previous.values().filter(|dp| !dp.path.is_empty()).count() as i64,
        );

        let mut tombstones: HashMap<ContainerId, String> = previous
            .iter()
            .map(|(id, dp)| (id.clone(), dp.path.clone()))
            .collect();

        let resolver = ContainerResolver::new(self.handler, &containers);
        let mut queries = Vec::with_capacity(containers.len());

        for container in &containers {
            if ctx.cancel.is_cancelled() {
                return Err(ReconcileError::Cancelled);
            }

            // Existing containers are never tombstoned, selected or not
            tombstones.remove(&container.id);

            let resolved = match resolver.resolve(&ctx.tenant, &ctx.owner, &container.id) {
                Ok(resolved) => resolved,
                Err(e) => {
                    // Unresolvable containers are skipped, never fatal to the run
                    warn!(
                        container_id = %container.id,
                        error = %e,
                        label = CounterKey::BadCollPath.as_str(),
                        "Resolving container path"
                    );
                    counter.inc(CounterKey::BadCollPath);
                    counter.inc(CounterKey::SkippedContainers);
                    continue;
                }
            };

            if !self.scope.matches(self.handler.category(), &resolved.location) {
                debug!(container_id = %container.id, location = %resolved.location, "Container out of scope");
                counter.inc(CounterKey::SkippedContainers);
                continue;
            }

            let prev = previous.get(&container.id);
            let mut prev_delta = prev.and_then(|dp| dp.delta.clone());
            let prev_path = match prev.filter(|dp| !dp.path.is_empty()) {
                None => None,
                Some(dp) => match CanonicalPath::from_data_layer_path(&dp.path, false) {
                    Ok(p) => Some(p),
                    Err(e) => {
                        error!(
                            container_id = %container.id,
                            error = %e,
                            label = CounterKey::BadPrevPath.as_str(),
                            "Parsing previous path"
                        );
                        counter.inc(CounterKey::BadPrevPath);
                        // An unusable path invalidates its delta token too
                        prev_delta = None;
                        None
                    }
                },
            };

            queries.push(Query {
                use_delta: self.handler.use_delta(container, ctx.delta_enabled),
                container: container.clone(),
                resolved,
                prev_path,
                prev_delta,
            });
        }

        if let Some(failure) = bus.failure() {
            return Err(ReconcileError::Failed(failure));
        }

        let results = self.query_items(ctx, queries).await;

        if ctx.cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }
        if let Some(failure) = bus.failure() {
            return Err(ReconcileError::Failed(failure));
        }

        let mut collections: HashMap<ContainerId, Collection> = HashMap::new();
        let mut updated = DeltaPaths::new();

        for (query, result) in results.into_iter().flatten() {
            let AddedAndRemoved {
                added,
                removed,
                new_delta_token,
                reset,
            } = result;
            let id = query.container.id;

            if new_delta_token.is_some() {
                counter.inc(CounterKey::NewDeltas);
            } else if !reset && query.use_delta {
                info!(container_id = %id, "Missing delta");
                counter.inc(CounterKey::MissingDelta);
            }

            let full_path = query.resolved.full_path;
            let collection = Collection::new(
                full_path.clone(),
                query.prev_path,
                Some(query.resolved.location),
                added,
                removed,
                reset,
            );

            counter.add(CounterKey::ItemsAdded, collection.added().len() as i64);
            counter.add(CounterKey::ItemsRemoved, collection.removed().len() as i64);
            counter.inc(CounterKey::NewPrevPaths);

            debug!(
                container_id = %id,
                state = %collection.state(),
                added = collection.added().len(),
                removed = collection.removed().len(),
                do_not_merge = reset,
                "Collection built"
            );

            updated.insert(
                id.clone(),
                DeltaPath {
                    delta: new_delta_token,
                    path: full_path.to_string(),
                },
            );
            collections.insert(id, collection);
        }

        self.add_tombstones(ctx, tombstones, &mut collections);

        if let Some(failure) = bus.failure() {
            return Err(ReconcileError::Failed(failure));
        }

        let metadata = make_metadata_collection(
            &ctx.tenant,
            &ctx.owner,
            self.handler.category(),
            &updated,
        )?;

        counter.add(CounterKey::Collections, collections.len() as i64);

        info!(
            collections = collections.len(),
            skipped = counter.get(CounterKey::SkippedContainers),
            new_deltas = counter.get(CounterKey::NewDeltas),
            "Category reconciled"
        );

        Ok(ReconcileOutput {
            collections,
            updated,
            metadata,
        })
    }

    /// Runs item-ID queries concurrently.
    ///
    /// Failed queries are recorded on the bus and yield `None`. A not-found
    /// container is reported as a delta reset so its collection is rebuilt
    /// from scratch. Once cancelled or failed, no new query starts.
    async fn query_items(
        &self,
        ctx: &BackupContext,
        queries: Vec<Query>,
    ) -> Vec<Option<(Query, AddedAndRemoved)>> {
        let semaphore = Arc::new(Semaphore::new(ctx.parallelism));
        let category = self.handler.category();

        let tasks = queries.into_iter().map(|query| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire_owned().await.ok()?;

                if ctx.cancel.is_cancelled() || ctx.bus.has_failure() {
                    return None;
                }

                let opts = ItemQueryOptions {
                    use_delta: query.use_delta,
                };
                let prev_delta = if query.use_delta {
                    query.prev_delta.as_ref()
                } else {
                    None
                };

                let result = tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => return None,
                    result = self.enumerator.get_container_item_ids(
                        &ctx.owner,
                        category,
                        &query.container.id,
                        prev_delta,
                        opts,
                    ) => result,
                };

                match result {
                    Ok(found) => Some((query, found)),
                    Err(e) if is_not_found(&e) => {
                        warn!(container_id = %query.container.id, "Container deleted in flight, resetting");
                        Some((
                            query,
                            AddedAndRemoved {
                                reset: true,
                                ..AddedAndRemoved::default()
                            },
                        ))
                    }
                    Err(e) => {
                        ctx.bus.add_recoverable(
                            LabeledError::from_anyhow(&e.context(format!(
                                "getting item IDs for container {}",
                                query.container.id
                            )))
                            .with_label(LABEL_FORCE_NO_BACKUP_CREATION),
                        );
                        None
                    }
                }
            }
        });

        join_all(tasks).await
    }

    fn add_tombstones(
        &self,
        ctx: &BackupContext,
        tombstones: HashMap<ContainerId, String>,
        collections: &mut HashMap<ContainerId, Collection>,
    ) {
        for (id, prev_path) in tombstones {
            if ctx.bus.has_failure() {
                return;
            }

            if collections.contains_key(&id) {
                ctx.counter.inc(CounterKey::CollectionTombstoneConflict);
                ctx.bus.add_recoverable(
                    LabeledError::new(format!(
                        "conflict: tombstone exists for a live collection: {id}"
                    ))
                    .with_label(CounterKey::CollectionTombstoneConflict.as_str()),
                );
                continue;
            }

            // Created and deleted before the previous run recorded a path
            if prev_path.is_empty() {
                continue;
            }

            let prev = match CanonicalPath::from_data_layer_path(&prev_path, false) {
                Ok(p) => p,
                Err(e) => {
                    error!(
                        container_id = %id,
                        error = %e,
                        label = CounterKey::BadPrevPath.as_str(),
                        "Parsing tombstone previous path"
                    );
                    ctx.counter.inc(CounterKey::BadPrevPath);
                    continue;
                }
            };

            debug!(container_id = %id, previous_path = %prev, "Tombstone");
            collections.insert(id, Collection::tombstone(prev));
        }
    }
}
