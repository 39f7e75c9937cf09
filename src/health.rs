//! Health Tracker: per-provider rolling error rate and consecutive-failure gate.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of consecutive failures at which a provider is flipped unhealthy.
pub const UNHEALTHY_THRESHOLD: u32 = 5;

/// Mutable per-provider health state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub healthy: bool,
    pub last_check_unix_ms: u64,
    pub latency_ms: Option<u64>,
    pub error_rate: f64,
    pub consecutive_failures: u32,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self {
            healthy: true,
            last_check_unix_ms: now_ms(),
            latency_ms: None,
            error_rate: 0.0,
            consecutive_failures: 0,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Lock-free per-provider health registry, one entry per initialized adapter.
#[derive(Debug, Default)]
pub struct HealthTracker {
    providers: DashMap<String, ProviderHealth>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider at init time so it reports healthy before its first call.
    pub fn register(&self, provider: &str) {
        self.providers
            .entry(provider.to_string())
            .or_insert_with(ProviderHealth::default);
    }

    /// Record a successful call: resets `consecutive_failures`, decays `error_rate` by
    /// the 0.9 factor, and restores `healthy`.
    pub fn record_success(&self, provider: &str, latency_ms: u64) {
        let mut entry = self.providers.entry(provider.to_string()).or_default();
        entry.consecutive_failures = 0;
        entry.healthy = true;
        entry.error_rate *= 0.9;
        entry.latency_ms = Some(latency_ms);
        entry.last_check_unix_ms = now_ms();
    }

    /// Record a failed call: bumps `consecutive_failures`, updates `error_rate` toward 1
    /// (`0.9 * rate + 0.1`), and flips `healthy` false once the threshold is reached.
    pub fn record_failure(&self, provider: &str) {
        let mut entry = self.providers.entry(provider.to_string()).or_default();
        entry.consecutive_failures += 1;
        entry.error_rate = entry.error_rate * 0.9 + 0.1;
        entry.last_check_unix_ms = now_ms();
        if entry.consecutive_failures >= UNHEALTHY_THRESHOLD {
            entry.healthy = false;
        }
    }

    pub fn is_healthy(&self, provider: &str) -> bool {
        self.providers
            .get(provider)
            .map(|h| h.healthy)
            .unwrap_or(true)
    }

    pub fn snapshot(&self, provider: &str) -> Option<ProviderHealth> {
        self.providers.get(provider).map(|h| h.clone())
    }

    pub fn latency_ms(&self, provider: &str) -> Option<u64> {
        self.providers.get(provider).and_then(|h| h.latency_ms)
    }

    pub fn error_rate(&self, provider: &str) -> f64 {
        self.providers.get(provider).map(|h| h.error_rate).unwrap_or(0.0)
    }

    pub fn all(&self) -> Vec<(String, ProviderHealth)> {
        self.providers
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_healthy_and_stays_healthy_on_success() {
        let tracker = HealthTracker::new();
        tracker.register("a");
        tracker.record_success("a", 100);
        let h = tracker.snapshot("a").unwrap();
        assert!(h.healthy);
        assert_eq!(h.consecutive_failures, 0);
    }

    #[test]
    fn five_consecutive_failures_flip_unhealthy() {
        let tracker = HealthTracker::new();
        tracker.register("a");
        for _ in 0..4 {
            tracker.record_failure("a");
        }
        assert!(tracker.is_healthy("a"));
        tracker.record_failure("a");
        assert!(!tracker.is_healthy("a"));
        assert_eq!(tracker.snapshot("a").unwrap().consecutive_failures, 5);
    }

    #[test]
    fn success_after_unhealthy_restores_health() {
        let tracker = HealthTracker::new();
        tracker.register("a");
        for _ in 0..5 {
            tracker.record_failure("a");
        }
        assert!(!tracker.is_healthy("a"));
        tracker.record_success("a", 50);
        assert!(tracker.is_healthy("a"));
        assert_eq!(tracker.snapshot("a").unwrap().consecutive_failures, 0);
    }

    #[test]
    fn error_rate_decays_on_success_and_climbs_on_failure() {
        let tracker = HealthTracker::new();
        tracker.register("a");
        tracker.record_failure("a");
        assert!((tracker.error_rate("a") - 0.1).abs() < 1e-9);
        tracker.record_success("a", 10);
        assert!((tracker.error_rate("a") - 0.09).abs() < 1e-9);
    }
}
