//! Prometheus metrics registry for TenantSync
//!
//! Mirrors the counter bus, run outcomes and rate limiter statistics as
//! labeled Prometheus metrics. Record once per finished run: the values are
//! added to monotonic counters.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use tenantsync_core::count::{Counter, CounterKey};
use tenantsync_core::domain::Category;
use tenantsync_core::fault::RunStatus;
use tenantsync_graph::{LimiterStats, RateLimiterSet};

/// Central metrics registry holding all Prometheus metrics.
pub struct MetricsRegistry {
    registry: Registry,
    /// Counter: counter bus values by (operation, counter)
    pub run_counters_total: IntCounterVec,
    /// Counter: finished runs by (operation, status)
    pub runs_total: IntCounterVec,
    /// Counter: limiter waits by category
    pub rate_limit_waits_total: IntCounterVec,
    /// Counter: throttle responses by category
    pub rate_limit_throttles_total: IntCounterVec,
    /// Histogram: run duration in seconds
    pub run_duration_seconds: HistogramVec,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry").finish_non_exhaustive()
    }
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with all metrics registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("tenantsync".to_string()), None)?;

        let run_counters_total = IntCounterVec::new(
            Opts::new("run_counters_total", "Counter bus values recorded by runs"),
            &["operation", "counter"],
        )?;
        registry.register(Box::new(run_counters_total.clone()))?;

        let runs_total = IntCounterVec::new(
            Opts::new("runs_total", "Finished runs by outcome"),
            &["operation", "status"],
        )?;
        registry.register(Box::new(runs_total.clone()))?;

        let rate_limit_waits_total = IntCounterVec::new(
            Opts::new(
                "rate_limit_waits_total",
                "Requests that waited for a rate limiter permit",
            ),
            &["category"],
        )?;
        registry.register(Box::new(rate_limit_waits_total.clone()))?;

        let rate_limit_throttles_total = IntCounterVec::new(
            Opts::new(
                "rate_limit_throttles_total",
                "Throttle responses received from the remote service",
            ),
            &["category"],
        )?;
        registry.register(Box::new(rate_limit_throttles_total.clone()))?;

        let run_duration_seconds = HistogramVec::new(
            HistogramOpts::new("run_duration_seconds", "Run duration in seconds")
                .buckets(vec![1.0, 10.0, 60.0, 600.0, 3600.0, f64::INFINITY]),
            &["operation"],
        )?;
        registry.register(Box::new(run_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            run_counters_total,
            runs_total,
            rate_limit_waits_total,
            rate_limit_throttles_total,
            run_duration_seconds,
        })
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    /// Adds every positive counter bus value under `operation`.
    pub fn record_counters(&self, operation: &str, counter: &Counter) {
        for key in CounterKey::ALL {
            let value = counter.get(key);
            if value > 0 {
                self.run_counters_total
                    .with_label_values(&[operation, key.as_str()])
                    .inc_by(value as u64);
            }
        }
    }

    /// Record a finished run.
    pub fn record_run(&self, operation: &str, status: RunStatus, duration_secs: f64) {
        let status = status.to_string();
        self.runs_total
            .with_label_values(&[operation, status.as_str()])
            .inc();
        self.run_duration_seconds
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    /// Record one limiter's totals.
    pub fn record_limiter(&self, category: Category, stats: LimiterStats) {
        self.rate_limit_waits_total
            .with_label_values(&[category.as_str()])
            .inc_by(stats.waits);
        self.rate_limit_throttles_total
            .with_label_values(&[category.as_str()])
            .inc_by(stats.throttles);
    }

    /// Record every limiter the run created.
    pub fn record_limiters(&self, limiters: &RateLimiterSet) {
        for (category, stats) in limiters.stats() {
            self.record_limiter(category, stats);
        }
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
