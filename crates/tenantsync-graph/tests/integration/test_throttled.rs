//! Rate-limited decorator tests

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tenantsync_core::config::{LimiterKind, LimiterSettings, RateLimitingConfig};
use tenantsync_core::domain::Category;
use tenantsync_core::ports::{
    is_not_found, throttled_for, IContainerEnumerator, IItemFetcher, ItemQueryOptions,
};
use tenantsync_graph::{RateLimiterSet, RetryPolicy, ThrottledEnumerator};

use crate::common::{cid, iid, FlakyService, OWNER};

fn window_config(requests: u32) -> RateLimitingConfig {
    RateLimitingConfig {
        enabled: true,
        default: LimiterSettings {
            kind: LimiterKind::SlidingWindow,
            window_seconds: 60,
            window_requests: requests,
            ..LimiterSettings::default()
        },
        categories: BTreeMap::new(),
    }
}

fn throttled(
    service: &Arc<FlakyService>,
    config: &RateLimitingConfig,
) -> ThrottledEnumerator<FlakyService> {
    ThrottledEnumerator::new(
        Arc::clone(service),
        Arc::new(RateLimiterSet::from_config(config)),
    )
}

#[tokio::test(start_paused = true)]
async fn test_list_retries_through_throttling() {
    let service = Arc::new(FlakyService::new(2, Duration::from_secs(5)));
    let enumerator = throttled(&service, &window_config(100));

    let containers = enumerator
        .list_containers(OWNER, Category::Email)
        .await
        .unwrap();

    assert_eq!(containers.len(), 1);
    assert_eq!(service.calls("list_containers"), 3);

    let stats = enumerator.limiters().stats();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].0, Category::Email);
    assert_eq!(stats[0].1.throttles, 2);
}

#[tokio::test(start_paused = true)]
async fn test_item_ids_pass_arguments_through() {
    let service = Arc::new(FlakyService::new(1, Duration::from_secs(1)));
    let enumerator = throttled(&service, &window_config(100));

    let result = enumerator
        .get_container_item_ids(
            OWNER,
            Category::Email,
            &cid("inbox"),
            None,
            ItemQueryOptions { use_delta: true },
        )
        .await
        .unwrap();

    assert_eq!(result.added.len(), 2);
    assert!(result.reset);
    assert_eq!(service.calls("get_container_item_ids"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_keep_throttle_classification() {
    let service = Arc::new(FlakyService::new(u32::MAX, Duration::from_secs(1)));
    let enumerator = throttled(&service, &window_config(100)).with_policy(RetryPolicy {
        max_retries: 3,
        ..RetryPolicy::default()
    });

    let err = enumerator
        .list_containers(OWNER, Category::Contacts)
        .await
        .unwrap_err();

    assert!(throttled_for(&err).is_some());
    assert_eq!(service.calls("list_containers"), 4);
}

#[tokio::test]
async fn test_not_found_is_returned_immediately() {
    let service = Arc::new(FlakyService::new(0, Duration::ZERO).with_missing("gone"));
    let enumerator = throttled(&service, &window_config(100));

    let err = enumerator
        .fetch_item(OWNER, Category::Email, &cid("inbox"), &iid("gone"))
        .await
        .unwrap_err();

    assert!(is_not_found(&err));
    assert_eq!(service.calls("fetch_item"), 1);

    let body = enumerator
        .fetch_item(OWNER, Category::Email, &cid("inbox"), &iid("m1"))
        .await
        .unwrap();
    assert_eq!(body, b"m1");
}

#[tokio::test(start_paused = true)]
async fn test_window_spaces_out_calls() {
    let service = Arc::new(FlakyService::new(0, Duration::ZERO));
    let enumerator = throttled(&service, &window_config(2));

    let start = tokio::time::Instant::now();
    for _ in 0..3 {
        enumerator
            .fetch_item(OWNER, Category::Email, &cid("inbox"), &iid("m1"))
            .await
            .unwrap();
    }

    assert!(start.elapsed() >= Duration::from_secs(60));
    assert_eq!(service.total(), 3);
    assert_eq!(enumerator.limiters().stats()[0].1.waits, 1);
}

#[tokio::test]
async fn test_disabled_limiting_creates_no_limiters() {
    let service = Arc::new(FlakyService::new(0, Duration::ZERO));
    let enumerator = ThrottledEnumerator::new(
        Arc::clone(&service),
        Arc::new(RateLimiterSet::disabled()),
    );

    enumerator
        .list_containers(OWNER, Category::Email)
        .await
        .unwrap();

    assert!(enumerator.limiters().stats().is_empty());
}
