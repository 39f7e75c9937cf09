//! Router Core — selection policies. Each function takes the set of healthy
//! provider names plus whatever signal the strategy needs and returns them ordered,
//! most-preferred first. Fallback-chain merging happens one layer up in `mod.rs`.

use crate::config::RouterConfig;
use crate::cost::estimate_tokens;
use crate::health::HealthTracker;
use crate::model::ComplexityTier;
use crate::providers::ProviderAdapter;
use crate::request::CompletionRequest;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

pub fn select_priority(healthy: &[String], config: &RouterConfig) -> Vec<String> {
    let mut ordered = healthy.to_vec();
    ordered.sort_by_key(|name| priority_of(config, name));
    debug!(?ordered, "priority selection");
    ordered
}

fn priority_of(config: &RouterConfig, name: &str) -> i32 {
    config
        .providers
        .iter()
        .find(|p| p.name == name)
        .map(|p| p.priority)
        .unwrap_or(i32::MAX)
}

pub fn select_cost(
    healthy: &[String],
    adapters: &HashMap<String, Arc<dyn ProviderAdapter>>,
    request: &CompletionRequest,
) -> Vec<String> {
    let estimated_tokens = estimate_tokens(&request.messages);
    let mut ordered = healthy.to_vec();
    ordered.sort_by(|a, b| {
        cost_score(adapters, a, estimated_tokens)
            .partial_cmp(&cost_score(adapters, b, estimated_tokens))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    debug!(?ordered, "cost selection");
    ordered
}

fn cost_score(adapters: &HashMap<String, Arc<dyn ProviderAdapter>>, name: &str, estimated_tokens: u32) -> f64 {
    adapters
        .get(name)
        .and_then(|a| a.catalog().default_model())
        .map(|m| (estimated_tokens as f64 / 1000.0) * (m.input_cost_per_1k + m.output_cost_per_1k))
        .unwrap_or(f64::MAX)
}

pub fn select_latency(healthy: &[String], health: &HealthTracker) -> Vec<String> {
    let mut ordered = healthy.to_vec();
    ordered.sort_by_key(|name| health.latency_ms(name).unwrap_or(u64::MAX));
    debug!(?ordered, "latency selection");
    ordered
}

pub fn select_round_robin(healthy: &[String], index: &AtomicUsize) -> Vec<String> {
    if healthy.is_empty() {
        return Vec::new();
    }
    let i = index.fetch_add(1, Ordering::Relaxed) % healthy.len();
    let mut ordered = Vec::with_capacity(healthy.len());
    ordered.push(healthy[i].clone());
    for (offset, name) in healthy.iter().enumerate() {
        if offset != i {
            ordered.push(name.clone());
        }
    }
    debug!(?ordered, head_index = i, "round-robin selection");
    ordered
}

pub fn select_adaptive(
    healthy: &[String],
    adapters: &HashMap<String, Arc<dyn ProviderAdapter>>,
    health: &HealthTracker,
    config: &RouterConfig,
    request: &CompletionRequest,
) -> Vec<String> {
    let latency_target_ms = request.metadata.latency_target_ms;
    let mut scored: Vec<(String, f64)> = healthy
        .iter()
        .map(|name| (name.clone(), adaptive_score(adapters, health, name, latency_target_ms)))
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| priority_of(config, &a.0).cmp(&priority_of(config, &b.0)))
    });
    let ordered: Vec<String> = scored.into_iter().map(|(name, _)| name).collect();
    debug!(?ordered, "adaptive selection");
    ordered
}

/// `latency_target_ms` is advisory and never changes the wire payload: a provider at
/// or under the target pays no latency penalty; one above it is penalized
/// only for the overage rather than its absolute latency, so a lenient target flattens
/// the latency term's influence on the ranking instead of silently ignoring it.
fn adaptive_score(
    adapters: &HashMap<String, Arc<dyn ProviderAdapter>>,
    health: &HealthTracker,
    name: &str,
    latency_target_ms: Option<u64>,
) -> f64 {
    let error_rate = health.error_rate(name);
    let latency = health.latency_ms(name).unwrap_or(u64::MAX) as f64;
    let latency_term = match latency_target_ms {
        Some(target) => (50.0 - (latency - target as f64).max(0.0) / 100.0).max(0.0),
        None => (50.0 - latency / 100.0).max(0.0),
    };

    let price_per_1k = adapters
        .get(name)
        .and_then(|a| a.catalog().default_model())
        .map(|m| m.input_cost_per_1k + m.output_cost_per_1k)
        .unwrap_or(0.0);
    let price_term = (50.0 - price_per_1k * 100.0).max(0.0);

    50.0 * (1.0 - error_rate) + latency_term + price_term
}

pub fn select_complexity(
    healthy: &[String],
    tier: ComplexityTier,
    config: &RouterConfig,
) -> Vec<String> {
    let recommended = config.complexity_tiers.get(&tier).cloned().unwrap_or_default();
    let mut ordered: Vec<String> = recommended
        .into_iter()
        .filter(|name| healthy.contains(name))
        .collect();
    for name in healthy {
        if !ordered.contains(name) {
            ordered.push(name.clone());
        }
    }
    debug!(?ordered, ?tier, "complexity selection");
    ordered
}
