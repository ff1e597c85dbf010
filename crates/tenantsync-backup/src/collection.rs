//! Item streaming for produced collections
//!
//! A [`BackupCollection`] pairs a reconciled [`Collection`] with the port
//! that fetches item payloads. The store drains [`BackupCollection::items`]
//! at its own pace: the producer task blocks on a full channel, which keeps
//! memory bounded by the channel capacity.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tenantsync_core::count::CounterKey;
use tenantsync_core::domain::{Collection, ContainerId, ItemId};
use tenantsync_core::fault::LabeledError;
use tenantsync_core::ports::{is_not_found, IItemFetcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::reconcile::BackupContext;

/// One entry streamed out of a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    /// Item payload to store
    Added { id: ItemId, data: Vec<u8> },
    /// Item to drop from the merged snapshot
    Removed { id: ItemId },
}

impl StreamItem {
    #[must_use]
    pub fn id(&self) -> &ItemId {
        match self {
            Self::Added { id, .. } | Self::Removed { id } => id,
        }
    }
}

/// A collection ready to be consumed by the backup store
#[derive(Clone)]
pub struct BackupCollection {
    container_id: ContainerId,
    collection: Arc<Collection>,
    fetcher: Arc<dyn IItemFetcher>,
    ctx: BackupContext,
}

impl std::fmt::Debug for BackupCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupCollection")
            .field("container_id", &self.container_id)
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl BackupCollection {
    pub fn new(
        container_id: ContainerId,
        collection: Collection,
        fetcher: Arc<dyn IItemFetcher>,
        ctx: BackupContext,
    ) -> Self {
        Self {
            container_id,
            collection: Arc::new(collection),
            fetcher,
            ctx: BackupContext {
                counter: ctx.counter.local(),
                ..ctx
            },
        }
    }

    #[must_use]
    pub fn container_id(&self) -> &ContainerId {
        &self.container_id
    }

    #[must_use]
    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Starts streaming items.
    ///
    /// Removed markers are sent first, then fetched payloads for added
    /// items. The channel closes when everything was sent, when `cancel`
    /// fires, or when the receiver is dropped.
    pub fn items(&self, cancel: CancellationToken) -> mpsc::Receiver<StreamItem> {
        let (tx, rx) = mpsc::channel(self.ctx.buffer_size);
        let this = self.clone();

        tokio::spawn(async move {
            this.stream_items(tx, cancel).await;
        });

        rx
    }

    async fn stream_items(self, tx: mpsc::Sender<StreamItem>, cancel: CancellationToken) {
        let counter = &self.ctx.counter;

        for id in self.collection.removed() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                sent = tx.send(StreamItem::Removed { id: id.clone() }) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
            counter.inc(CounterKey::StreamItemsRemoved);
        }

        let category = self.collection.category();
        let fetcher = &self.fetcher;
        let owner = self.ctx.owner.as_str();
        let container_id = &self.container_id;

        let mut fetches = stream::iter(self.collection.added().iter().cloned())
            .map(|id| async move {
                let result = fetcher.fetch_item(owner, category, container_id, &id).await;
                (id, result)
            })
            .buffer_unordered(self.ctx.parallelism);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(container_id = %self.container_id, "Item stream cancelled");
                    return;
                }
                next = fetches.next() => next,
            };

            let Some((id, result)) = next else {
                break;
            };

            let data = match result {
                Ok(data) => data,
                Err(e) if is_not_found(&e) => {
                    trace!(item_id = %id, "Item deleted in flight");
                    counter.inc(CounterKey::StreamItemsDeletedInFlight);
                    continue;
                }
                Err(e) => {
                    counter.inc(CounterKey::StreamItemsErred);
                    self.ctx.bus.add_recoverable(LabeledError::from_anyhow(
                        &e.context(format!("fetching item {id}")),
                    ));
                    if self.ctx.bus.has_failure() {
                        return;
                    }
                    continue;
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                sent = tx.send(StreamItem::Added { id, data }) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
            counter.inc(CounterKey::StreamItemsAdded);
        }

        debug!(
            container_id = %self.container_id,
            added = counter.get(CounterKey::StreamItemsAdded),
            removed = counter.get(CounterKey::StreamItemsRemoved),
            "Item stream finished"
        );
    }
}
