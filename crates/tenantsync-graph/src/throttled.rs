//! Rate-limited decorators for the remote ports
//!
//! [`ThrottledEnumerator`] wraps an [`IContainerEnumerator`] (and
//! [`IItemFetcher`]) so every call goes through the category's limiter and
//! the throttle retry loop. The engines see the plain port traits.

use std::sync::Arc;

use tenantsync_core::domain::{Category, Container, ContainerId, DeltaToken, ItemId};
use tenantsync_core::ports::{AddedAndRemoved, IContainerEnumerator, IItemFetcher, ItemQueryOptions};

use crate::rate_limit::RateLimiterSet;
use crate::retry::{with_retry, RetryPolicy};

/// Rate-limited enumerator and item fetcher
pub struct ThrottledEnumerator<E> {
    inner: Arc<E>,
    limiters: Arc<RateLimiterSet>,
    policy: RetryPolicy,
}

impl<E> std::fmt::Debug for ThrottledEnumerator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottledEnumerator")
            .field("limiters", &self.limiters)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<E> ThrottledEnumerator<E> {
    pub fn new(inner: Arc<E>, limiters: Arc<RateLimiterSet>) -> Self {
        Self {
            inner,
            limiters,
            policy: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn limiters(&self) -> &Arc<RateLimiterSet> {
        &self.limiters
    }
}

#[async_trait::async_trait]
impl<E> IContainerEnumerator for ThrottledEnumerator<E>
where
    E: IContainerEnumerator + 'static,
{
    async fn list_containers(
        &self,
        owner: &str,
        category: Category,
    ) -> anyhow::Result<Vec<Container>> {
        let limiter = self.limiters.for_category(category);
        with_retry("list_containers", &self.policy, limiter.as_deref(), || {
            self.inner.list_containers(owner, category)
        })
        .await
    }

    async fn get_container_item_ids(
        &self,
        owner: &str,
        category: Category,
        container_id: &ContainerId,
        prev_delta: Option<&DeltaToken>,
        opts: ItemQueryOptions,
    ) -> anyhow::Result<AddedAndRemoved> {
        let limiter = self.limiters.for_category(category);
        with_retry("get_container_item_ids", &self.policy, limiter.as_deref(), || {
            self.inner
                .get_container_item_ids(owner, category, container_id, prev_delta, opts)
        })
        .await
    }
}

#[async_trait::async_trait]
impl<E> IItemFetcher for ThrottledEnumerator<E>
where
    E: IItemFetcher + 'static,
{
    async fn fetch_item(
        &self,
        owner: &str,
        category: Category,
        container_id: &ContainerId,
        item_id: &ItemId,
    ) -> anyhow::Result<Vec<u8>> {
        let limiter = self.limiters.for_category(category);
        with_retry("fetch_item", &self.policy, limiter.as_deref(), || {
            self.inner.fetch_item(owner, category, container_id, item_id)
        })
        .await
    }
}
