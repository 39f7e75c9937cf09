//! Router and provider configuration. Supplied once at initialization and immutable
//! thereafter.

use crate::model::ComplexityTier;
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One backend's static configuration. Lower `priority` is tried first under the
/// `priority` strategy and wins ties under `adaptive`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_priority() -> i32 {
    100
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            name: name.into(),
            kind,
            api_key: None,
            base_url: None,
            enabled: true,
            priority: default_priority(),
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Which wire protocol an adapter speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    Groq,
    Ollama,
}

/// Active selection policy for the Router Core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    Priority,
    Cost,
    Latency,
    Complexity,
    RoundRobin,
    Adaptive,
}

impl Default for RoutingStrategy {
    fn default() -> Self {
        RoutingStrategy::Priority
    }
}

/// Whether per-request accounting and tracing verbosity are enabled. Neither toggle
/// disables metrics recording itself — only the pre-call budget estimate and the
/// volume of debug-level tracing events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_true")]
    pub cost_tracking: bool,
    #[serde(default = "default_true")]
    pub logging: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            cost_tracking: true,
            logging: true,
        }
    }
}

/// Full router configuration, supplied to `Router::new`/`initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub providers: Vec<ProviderConfig>,
    pub default_provider: Option<String>,
    #[serde(default)]
    pub fallback_chain: Vec<String>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub routing_strategy: RoutingStrategy,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Maps a complexity tier to the providers recommended for it, in preference
    /// order. Providers absent from the active tier's list become fallback tail.
    #[serde(default)]
    pub complexity_tiers: HashMap<ComplexityTier, Vec<String>>,
}

impl RouterConfig {
    pub fn new(providers: Vec<ProviderConfig>) -> Self {
        Self {
            providers,
            default_provider: None,
            fallback_chain: Vec::new(),
            retry: RetryConfig::default(),
            routing_strategy: RoutingStrategy::default(),
            observability: ObservabilityConfig::default(),
            complexity_tiers: HashMap::new(),
        }
    }

    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter().filter(|p| p.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_routing_strategy_is_priority() {
        assert_eq!(RoutingStrategy::default(), RoutingStrategy::Priority);
    }

    #[test]
    fn enabled_providers_filters_disabled_entries() {
        let config = RouterConfig::new(vec![
            ProviderConfig::new("a", ProviderKind::Anthropic),
            {
                let mut p = ProviderConfig::new("b", ProviderKind::OpenAi);
                p.enabled = false;
                p
            },
        ]);
        let names: Vec<&str> = config.enabled_providers().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn provider_config_builder_sets_fields() {
        let config = ProviderConfig::new("anthropic", ProviderKind::Anthropic)
            .with_api_key("sk-test")
            .with_base_url("https://api.anthropic.com")
            .with_priority(1);
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.priority, 1);
    }
}
