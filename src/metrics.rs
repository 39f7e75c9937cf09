//! Metrics Registry: monotonic counters plus a Welford running mean latency.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Welford's incremental mean, used so the running latency average never needs to
/// replay the full sample history.
#[derive(Debug, Default, Clone, Copy)]
struct Welford {
    count: u64,
    mean: f64,
}

impl Welford {
    fn update(&mut self, sample: f64) {
        self.count += 1;
        self.mean += (sample - self.mean) / self.count as f64;
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProviderTally {
    pub requests: u64,
    pub tokens: u64,
    pub cost_usd: f64,
}

/// Point-in-time read of the registry's counters.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub average_latency_ms: f64,
    pub per_provider: std::collections::HashMap<String, ProviderTally>,
}

/// Aggregate counters, global and per-provider. All fields are monotonic until an
/// explicit [`MetricsRegistry::reset`].
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    total_tokens: AtomicU64,
    total_cost_usd: Mutex<f64>,
    latency: Mutex<Welford>,
    per_provider: DashMap<String, ProviderTally>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful terminal outcome: totals, per-provider tallies, and the
    /// running mean latency (only successful requests feed the latency average).
    pub fn record_success(&self, provider: &str, tokens: u32, cost_usd: f64, latency_ms: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
        self.total_tokens.fetch_add(tokens as u64, Ordering::Relaxed);
        *self.total_cost_usd.lock() += cost_usd;
        self.latency.lock().update(latency_ms as f64);

        let mut tally = self.per_provider.entry(provider.to_string()).or_default();
        tally.requests += 1;
        tally.tokens += tokens as u64;
        tally.cost_usd += cost_usd;
    }

    /// Record a failed terminal outcome: only the total and failure counters move.
    pub fn record_failure(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let per_provider = self
            .per_provider
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
            total_cost_usd: *self.total_cost_usd.lock(),
            average_latency_ms: self.latency.lock().mean,
            per_provider,
        }
    }

    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.successful_requests.store(0, Ordering::Relaxed);
        self.failed_requests.store(0, Ordering::Relaxed);
        self.total_tokens.store(0, Ordering::Relaxed);
        *self.total_cost_usd.lock() = 0.0;
        *self.latency.lock() = Welford::default();
        self.per_provider.clear();
    }
}
