//! Multi-category backup orchestration
//!
//! Parses the previous metadata once, then reconciles each requested
//! category in order. Category-fatal errors are recorded as recoverable
//! errors so sibling categories still run; a hard failure on the fault bus
//! stops new categories from starting.

use std::sync::Arc;

use tenantsync_core::config::BackupConfig;
use tenantsync_core::count::Counter;
use tenantsync_core::domain::{Category, MetadataCollection, OperationId};
use tenantsync_core::fault::{FaultBus, LabeledError, RunStatus, LABEL_FORCE_NO_BACKUP_CREATION};
use tenantsync_core::ports::{IContainerEnumerator, IItemFetcher};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::collection::BackupCollection;
use crate::handler::CategoryHandler;
use crate::metadata::parse_metadata_collections;
use crate::reconcile::{BackupContext, Reconciler};
use crate::scope::{GlobScope, ScopeMatcher};
use crate::ReconcileError;

/// Everything a backup run hands to the store
#[derive(Debug)]
pub struct BackupOutcome {
    /// Identifier tagged on this run's log lines
    pub operation_id: OperationId,
    /// Data collections and tombstones across all categories
    pub collections: Vec<BackupCollection>,
    /// One metadata collection per category that completed
    pub metadata: Vec<MetadataCollection>,
    /// False when the previous metadata was unusable and this is a full backup
    pub can_use_previous_backup: bool,
    /// Run outcome under the configured failure policy
    pub status: RunStatus,
    /// The error that failed the run, if any
    pub failure: Option<LabeledError>,
}

/// Produces backup collections for one resource owner
pub struct BackupProducer {
    enumerator: Arc<dyn IContainerEnumerator>,
    fetcher: Arc<dyn IItemFetcher>,
    scope: Arc<dyn ScopeMatcher>,
    config: BackupConfig,
}

impl BackupProducer {
    /// Creates a producer whose scope comes from the `backup` config section
    pub fn new(
        enumerator: Arc<dyn IContainerEnumerator>,
        fetcher: Arc<dyn IItemFetcher>,
        config: BackupConfig,
    ) -> Result<Self, ReconcileError> {
        let scope = Arc::new(GlobScope::from_config(&config)?);
        Ok(Self {
            enumerator,
            fetcher,
            scope,
            config,
        })
    }

    /// Replaces the scope matcher
    #[must_use]
    pub fn with_scope(mut self, scope: Arc<dyn ScopeMatcher>) -> Self {
        self.scope = scope;
        self
    }

    /// Reconciles every requested category.
    ///
    /// Only cancellation and a failure to parse metadata (which is itself
    /// only possible through cancellation) return `Err`. Everything else is
    /// reported through the fault bus and summarized in the outcome.
    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(
        level = "info",
        skip(self, previous, bus, counter, cancel),
        fields(operation_id = tracing::field::Empty)
    )]
    pub async fn produce_backup_collections(
        &self,
        tenant: &str,
        owner: &str,
        categories: &[Category],
        previous: &[MetadataCollection],
        bus: &Arc<FaultBus>,
        counter: &Arc<Counter>,
        cancel: &CancellationToken,
    ) -> Result<BackupOutcome, ReconcileError> {
        let operation_id = OperationId::new();
        tracing::Span::current().record("operation_id", tracing::field::display(operation_id));

        let parsed = parse_metadata_collections(previous, cancel)?;
        if !parsed.can_use_previous_backup {
            warn!("Previous backup metadata unusable, running a full backup");
        }

        let run_ctx = BackupContext::new(
            tenant,
            owner,
            &self.config,
            Arc::clone(bus),
            Arc::clone(counter),
            cancel.clone(),
        );

        let mut collections = Vec::new();
        let mut metadata = Vec::new();

        for &category in categories {
            if cancel.is_cancelled() {
                return Err(ReconcileError::Cancelled);
            }
            if bus.has_failure() {
                warn!(category = %category, "Run failed, not starting category");
                break;
            }

            let ctx = run_ctx.local();
            let handler = CategoryHandler::for_category(category);
            let reconciler =
                Reconciler::new(handler, Arc::clone(&self.enumerator), Arc::clone(&self.scope));

            let containers = match self.enumerator.list_containers(owner, category).await {
                Ok(containers) => containers,
                Err(e) => {
                    ctx.bus.add_recoverable(
                        LabeledError::from_anyhow(&e.context(format!("listing {category} containers")))
                            .with_label(LABEL_FORCE_NO_BACKUP_CREATION),
                    );
                    continue;
                }
            };

            let output = match reconciler
                .reconcile(&ctx, parsed.for_category(category), containers)
                .await
            {
                Ok(output) => output,
                Err(ReconcileError::Cancelled) => return Err(ReconcileError::Cancelled),
                Err(ReconcileError::Failed(e)) => {
                    warn!(category = %category, error = %e, "Category failed");
                    break;
                }
                Err(e) => {
                    ctx.bus.add_recoverable(LabeledError::from_error(&e));
                    continue;
                }
            };

            for (id, collection) in output.collections {
                collections.push(BackupCollection::new(
                    id,
                    collection,
                    Arc::clone(&self.fetcher),
                    ctx.clone(),
                ));
            }
            metadata.push(output.metadata);
        }

        let failure = bus.finalize();
        let status = bus.status();

        info!(
            collections = collections.len(),
            metadata = metadata.len(),
            status = %status,
            recovered = bus.recovered().len(),
            "Backup collections produced"
        );

        Ok(BackupOutcome {
            operation_id,
            collections,
            metadata,
            can_use_previous_backup: parsed.can_use_previous_backup,
            status,
            failure,
        })
    }
}
