//! Prometheus counters for cache and provider activity.
//!
//! Rendered in text exposition format at `GET /metrics`.

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

use crate::cache::key::DataKind;

#[derive(Clone)]
pub struct CacheMetrics {
    registry: Registry,
    lookups: IntCounterVec,
    provider_fetches: IntCounterVec,
    write_failures: IntCounterVec,
}

impl CacheMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let lookups = IntCounterVec::new(
            Opts::new("vendor_cache_lookups_total", "Cache tier lookups by outcome"),
            &["tier", "outcome"],
        )?;
        let provider_fetches = IntCounterVec::new(
            Opts::new(
                "vendor_cache_provider_fetches_total",
                "Provider calls by data kind and outcome",
            ),
            &["data_kind", "outcome"],
        )?;
        let write_failures = IntCounterVec::new(
            Opts::new(
                "vendor_cache_write_failures_total",
                "Failed write-throughs by tier",
            ),
            &["tier"],
        )?;

        registry.register(Box::new(lookups.clone()))?;
        registry.register(Box::new(provider_fetches.clone()))?;
        registry.register(Box::new(write_failures.clone()))?;

        Ok(Self {
            registry,
            lookups,
            provider_fetches,
            write_failures,
        })
    }

    /// `outcome` is one of `hit`, `miss` or `error`.
    pub fn record_lookup(&self, tier: &str, outcome: &str) {
        self.lookups.with_label_values(&[tier, outcome]).inc();
    }

    pub fn record_fetch(&self, kind: DataKind, outcome: &str) {
        self.provider_fetches
            .with_label_values(&[kind.as_str(), outcome])
            .inc();
    }

    pub fn record_write_failure(&self, tier: &str) {
        self.write_failures.with_label_values(&[tier]).inc();
    }

    pub fn lookup_count(&self, tier: &str, outcome: &str) -> u64 {
        self.lookups.with_label_values(&[tier, outcome]).get()
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buf) {
            error!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}
