//! Rate limiting and adaptive throttling for remote calls
//!
//! Limits are applied per data category, ahead of the remote call, so the
//! service rarely has to answer with a throttling error.
//!
//! ## Architecture
//!
//! - [`TokenBucketLimiter`]: fixed sustained rate with a burst allowance
//! - [`SlidingWindowLimiter`]: request budget per time window whose size
//!   adapts to server responses (shrinks on throttle, recovers on success)
//! - [`RateLimiterSet`]: one limiter per category, built from configuration
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tenantsync_core::config::RateLimitingConfig;
//! use tenantsync_core::domain::Category;
//! use tenantsync_graph::rate_limit::RateLimiterSet;
//!
//! # async fn example() {
//! let limiters = RateLimiterSet::from_config(&RateLimitingConfig::default());
//! if let Some(limiter) = limiters.for_category(Category::Email) {
//!     limiter.acquire().await;
//!     // ... make the remote call ...
//!     limiter.on_success();
//! }
//! # }
//! ```

use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tenantsync_core::config::{LimiterKind, LimiterSettings, RateLimitingConfig};
use tenantsync_core::domain::Category;
use tokio::time::Instant;
use tracing::{debug, info, warn};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Token bucket
// ============================================================================

/// Fixed-rate limiter with a burst capacity.
///
/// Backed by `governor`'s GCRA implementation.
pub struct TokenBucketLimiter {
    limiter: DefaultDirectRateLimiter,
    requests_per_minute: NonZeroU32,
    burst: NonZeroU32,
}

impl std::fmt::Debug for TokenBucketLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucketLimiter")
            .field("requests_per_minute", &self.requests_per_minute)
            .field("burst", &self.burst)
            .finish_non_exhaustive()
    }
}

impl TokenBucketLimiter {
    /// Creates a limiter. Zero values are raised to one.
    pub fn new(requests_per_minute: u32, burst: u32) -> Self {
        let requests_per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(requests_per_minute).allow_burst(burst);

        Self {
            limiter: RateLimiter::direct(quota),
            requests_per_minute,
            burst,
        }
    }

    /// Takes a permit if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Waits until a permit is available and takes it
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    #[must_use]
    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute.get()
    }

    #[must_use]
    pub fn burst(&self) -> u32 {
        self.burst.get()
    }
}

// ============================================================================
// Sliding window
// ============================================================================

#[derive(Debug)]
struct WindowState {
    /// Start times of the requests inside the current window
    issued: VecDeque<Instant>,
    /// Requests allowed per window after throttle adjustments
    effective_limit: u32,
    /// Consecutive successes since the last throttle
    success_count: u64,
}

/// Request budget over a sliding time window.
///
/// A throttle response halves the budget (never below one). Every 100
/// consecutive successes restore 5% of it, up to the configured budget.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    window: Duration,
    limit: u32,
    state: Mutex<WindowState>,
}

impl SlidingWindowLimiter {
    pub fn new(window: Duration, limit: u32) -> Self {
        let limit = limit.max(1);
        Self {
            window,
            limit,
            state: Mutex::new(WindowState {
                issued: VecDeque::new(),
                effective_limit: limit,
                success_count: 0,
            }),
        }
    }

    fn expire(&self, state: &mut WindowState, now: Instant) {
        while let Some(&oldest) = state.issued.front() {
            if now.duration_since(oldest) >= self.window {
                state.issued.pop_front();
            } else {
                break;
            }
        }
    }

    /// Takes a slot, or returns how long until the oldest slot frees up
    fn try_reserve(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut state = lock(&self.state);
        self.expire(&mut state, now);

        if (state.issued.len() as u64) < u64::from(state.effective_limit) {
            state.issued.push_back(now);
            return Ok(());
        }

        // over budget after a throttle: wait for enough slots to expire
        let excess = state.issued.len() - state.effective_limit as usize;
        let frees_at = state.issued[excess] + self.window;
        Err(frees_at.saturating_duration_since(now))
    }

    /// Takes a slot if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.try_reserve().is_ok()
    }

    /// Waits until a slot is available and takes it
    pub async fn acquire(&self) {
        loop {
            match self.try_reserve() {
                Ok(()) => return,
                Err(wait) => {
                    let wait = wait.max(Duration::from_millis(1));
                    debug!(wait_ms = wait.as_millis() as u64, "Window full, waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Configured requests per window
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Current requests per window after throttle adjustments
    #[must_use]
    pub fn effective_limit(&self) -> u32 {
        lock(&self.state).effective_limit
    }

    /// Requests counted in the current window
    #[must_use]
    pub fn in_window(&self) -> usize {
        let mut state = lock(&self.state);
        self.expire(&mut state, Instant::now());
        state.issued.len()
    }

    pub fn on_success(&self) {
        let mut state = lock(&self.state);
        state.success_count += 1;

        if state.success_count % 100 == 0 && state.effective_limit < self.limit {
            let old = state.effective_limit;
            let increase = (f64::from(old) * 0.05).max(1.0) as u32;
            state.effective_limit = (old + increase).min(self.limit);
            debug!(
                old_limit = old,
                new_limit = state.effective_limit,
                successes = state.success_count,
                "Adaptive recovery: raising window budget"
            );
        }
    }

    pub fn on_throttle(&self) {
        let mut state = lock(&self.state);
        let old = state.effective_limit;
        state.effective_limit = (old / 2).max(1);
        state.success_count = 0;
        warn!(
            old_limit = old,
            new_limit = state.effective_limit,
            "Throttle detected: halving window budget"
        );
    }
}

// ============================================================================
// Limiter
// ============================================================================

/// Wait and throttle totals of one limiter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimiterStats {
    /// Acquisitions that had to wait
    pub waits: u64,
    /// Throttle responses reported
    pub throttles: u64,
}

#[derive(Debug)]
enum LimiterKindImpl {
    TokenBucket(TokenBucketLimiter),
    SlidingWindow(SlidingWindowLimiter),
}

/// A configured limiter of either kind
#[derive(Debug)]
pub struct Limiter {
    inner: LimiterKindImpl,
    waits: AtomicU64,
    throttles: AtomicU64,
}

impl Limiter {
    pub fn from_settings(settings: &LimiterSettings) -> Self {
        let inner = match settings.kind {
            LimiterKind::TokenBucket => LimiterKindImpl::TokenBucket(TokenBucketLimiter::new(
                settings.requests_per_minute,
                settings.burst,
            )),
            LimiterKind::SlidingWindow => {
                LimiterKindImpl::SlidingWindow(SlidingWindowLimiter::new(
                    Duration::from_secs(settings.window_seconds),
                    settings.window_requests,
                ))
            }
        };

        Self {
            inner,
            waits: AtomicU64::new(0),
            throttles: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn kind(&self) -> LimiterKind {
        match self.inner {
            LimiterKindImpl::TokenBucket(_) => LimiterKind::TokenBucket,
            LimiterKindImpl::SlidingWindow(_) => LimiterKind::SlidingWindow,
        }
    }

    fn try_acquire(&self) -> bool {
        match &self.inner {
            LimiterKindImpl::TokenBucket(l) => l.try_acquire(),
            LimiterKindImpl::SlidingWindow(l) => l.try_acquire(),
        }
    }

    /// Waits for a permit
    pub async fn acquire(&self) {
        if self.try_acquire() {
            return;
        }

        self.waits.fetch_add(1, Ordering::Relaxed);
        match &self.inner {
            LimiterKindImpl::TokenBucket(l) => l.acquire().await,
            LimiterKindImpl::SlidingWindow(l) => l.acquire().await,
        }
    }

    /// Reports a successful call
    pub fn on_success(&self) {
        if let LimiterKindImpl::SlidingWindow(l) = &self.inner {
            l.on_success();
        }
    }

    /// Reports a throttle response
    pub fn on_throttle(&self) {
        self.throttles.fetch_add(1, Ordering::Relaxed);
        if let LimiterKindImpl::SlidingWindow(l) = &self.inner {
            l.on_throttle();
        }
    }

    #[must_use]
    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            waits: self.waits.load(Ordering::Relaxed),
            throttles: self.throttles.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// RateLimiterSet
// ============================================================================

/// Per-category limiters for one run.
///
/// Built once per run and passed to the adapters that need it. Limiters are
/// created on first use from the category's settings.
#[derive(Debug)]
pub struct RateLimiterSet {
    config: RateLimitingConfig,
    limiters: DashMap<Category, Arc<Limiter>>,
}

impl RateLimiterSet {
    pub fn from_config(config: &RateLimitingConfig) -> Self {
        info!(
            enabled = config.enabled,
            overrides = config.categories.len(),
            "Rate limiting configured"
        );
        Self {
            config: config.clone(),
            limiters: DashMap::new(),
        }
    }

    /// A set that never limits
    pub fn disabled() -> Self {
        Self::from_config(&RateLimitingConfig {
            enabled: false,
            ..RateLimitingConfig::default()
        })
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// The category's limiter, or `None` when limiting is disabled
    #[must_use]
    pub fn for_category(&self, category: Category) -> Option<Arc<Limiter>> {
        if !self.config.enabled {
            return None;
        }

        let limiter = self
            .limiters
            .entry(category)
            .or_insert_with(|| {
                let settings = self.config.for_category(category);
                debug!(%category, kind = ?settings.kind, "Creating rate limiter");
                Arc::new(Limiter::from_settings(settings))
            })
            .clone();

        Some(limiter)
    }

    /// Stats of every limiter created so far, by category
    #[must_use]
    pub fn stats(&self) -> Vec<(Category, LimiterStats)> {
        let mut stats: Vec<_> = self
            .limiters
            .iter()
            .map(|r| (*r.key(), r.value().stats()))
            .collect();
        stats.sort_by_key(|(c, _)| c.as_str());
        stats
    }
}
