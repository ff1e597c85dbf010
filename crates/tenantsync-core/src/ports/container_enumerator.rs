//! Container enumerator port (driven/secondary port)
//!
//! This module defines the interface the backup engine uses to discover
//! containers and the item changes inside them. Implementations page through
//! the remote API; the engine never sees raw pages.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result`; errors the engine must branch on are reported as
//!   [`RemoteError`](super::errors::RemoteError) inside the chain.
//! - A delta query that the service rejects as expired is reported as a
//!   successful result with `reset = true`, not as an error.

use serde::{Deserialize, Serialize};

use crate::domain::{Category, Container, ContainerId, DeltaToken, ItemId};

/// Options for a single item-ID query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemQueryOptions {
    /// Use the delta endpoint (with the previous token when one is given)
    pub use_delta: bool,
}

/// Added and removed item IDs for one container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedAndRemoved {
    /// Items created or modified since the previous token
    pub added: Vec<ItemId>,
    /// Items deleted or moved out since the previous token
    pub removed: Vec<ItemId>,
    /// Token for the next run, absent for full enumerations
    pub new_delta_token: Option<DeltaToken>,
    /// The previous token was invalidated and a full enumeration was done
    pub reset: bool,
}

/// Port trait for enumerating containers and their item changes
#[async_trait::async_trait]
pub trait IContainerEnumerator: Send + Sync {
    /// Lists every container of `category` owned by `owner`
    async fn list_containers(
        &self,
        owner: &str,
        category: Category,
    ) -> anyhow::Result<Vec<Container>>;

    /// Returns the added and removed item IDs in one container
    ///
    /// # Arguments
    /// * `prev_delta` - Token from the previous run, `None` for a full enumeration
    /// * `opts` - Whether delta mode may be used for this container
    async fn get_container_item_ids(
        &self,
        owner: &str,
        category: Category,
        container_id: &ContainerId,
        prev_delta: Option<&DeltaToken>,
        opts: ItemQueryOptions,
    ) -> anyhow::Result<AddedAndRemoved>;
}

/// Port trait for fetching the serialized payload of a single item
#[async_trait::async_trait]
pub trait IItemFetcher: Send + Sync {
    /// Fetches one item. A [`RemoteError::NotFound`](super::errors::RemoteError)
    /// means the item was deleted after it was enumerated.
    async fn fetch_item(
        &self,
        owner: &str,
        category: Category,
        container_id: &ContainerId,
        item_id: &ItemId,
    ) -> anyhow::Result<Vec<u8>>;
}
