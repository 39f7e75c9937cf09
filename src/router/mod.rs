//! Router Core and Facade: selects an ordered provider list
//! under the active strategy, drives the fallback loop through the Retry Executor,
//! and exposes the public entry points collaborators call.

pub mod selection;

use crate::complexity;
use crate::config::{ProviderConfig, RoutingStrategy, RouterConfig};
use crate::cost::estimate_cost;
use crate::error::{Result, RouterError};
use crate::health::HealthTracker;
use crate::message::ImagePart;
use crate::metrics::{MetricsRegistry, MetricsSnapshot};
use crate::model::ModelDescriptor;
use crate::providers::{build_adapter, ProviderAdapter};
use crate::request::CompletionRequest;
use crate::response::{CompletionResponse, FinishReason};
use crate::retry::{self, CancelToken, RetryConfig};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tracing::{debug, warn};

/// The central orchestrator. Created via [`Router::new`], then [`Router::initialize`]
/// spins up one adapter per enabled provider concurrently; adapters and the health/
/// metrics registries live for the process lifetime thereafter.
pub struct Router {
    config: RouterConfig,
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    health: HealthTracker,
    metrics: MetricsRegistry,
    round_robin_index: AtomicUsize,
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            adapters: HashMap::new(),
            health: HealthTracker::new(),
            metrics: MetricsRegistry::new(),
            round_robin_index: AtomicUsize::new(0),
        }
    }

    /// Construct one adapter per enabled provider concurrently. A single provider's
    /// init failure is isolated and logged; the call only fails if every provider
    /// fails, since the router needs at least one live adapter to be useful.
    pub async fn initialize(&mut self) -> Result<()> {
        let enabled: Vec<ProviderConfig> = self.config.enabled_providers().cloned().collect();
        let results = join_all(enabled.iter().map(build_adapter)).await;

        let mut succeeded = 0;
        for (provider_config, result) in enabled.iter().zip(results) {
            match result {
                Ok(adapter) => {
                    self.health.register(&provider_config.name);
                    self.adapters.insert(provider_config.name.clone(), adapter);
                    succeeded += 1;
                }
                Err(err) => {
                    warn!(provider = %provider_config.name, error = %err, "provider adapter failed to initialize");
                }
            }
        }

        if succeeded == 0 {
            return Err(RouterError::provider_unavailable(
                "router",
                "no provider adapter initialized successfully",
            ));
        }
        Ok(())
    }

    fn healthy_providers(&self) -> Vec<String> {
        self.adapters
            .keys()
            .filter(|name| self.health.is_healthy(name))
            .cloned()
            .collect()
    }

    fn all_initialized(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    /// Ordered provider list for a request: preferred provider first if set,
    /// otherwise the active strategy's ordering, with the configured fallback chain
    /// appended and de-duplicated so every initialized provider appears at most once.
    fn select_providers(&self, request: &CompletionRequest) -> Vec<String> {
        let mut ordered = Vec::new();
        let mut seen = HashSet::new();

        if let Some(preferred) = &request.metadata.preferred_provider {
            if self.adapters.contains_key(preferred) {
                ordered.push(preferred.clone());
                seen.insert(preferred.clone());
            }
        }

        let healthy = self.healthy_providers();
        let strategy_order = match self.config.routing_strategy {
            RoutingStrategy::Priority => selection::select_priority(&healthy, &self.config),
            RoutingStrategy::Cost => selection::select_cost(&healthy, &self.adapters, request),
            RoutingStrategy::Latency => selection::select_latency(&healthy, &self.health),
            RoutingStrategy::RoundRobin => {
                selection::select_round_robin(&healthy, &self.round_robin_index)
            }
            RoutingStrategy::Adaptive => {
                selection::select_adaptive(&healthy, &self.adapters, &self.health, &self.config, request)
            }
            RoutingStrategy::Complexity => {
                let tier = request
                    .metadata
                    .task_complexity
                    .unwrap_or_else(|| complexity::infer(&request.messages));
                selection::select_complexity(&healthy, tier, &self.config)
            }
        };

        for name in strategy_order {
            if seen.insert(name.clone()) {
                ordered.push(name);
            }
        }

        for name in &self.config.fallback_chain {
            if self.adapters.contains_key(name) && seen.insert(name.clone()) {
                ordered.push(name.clone());
            }
        }

        // Unhealthy providers remain in the fallback tail so a bad health signal
        // never starves the system when every provider is flagged unhealthy.
        for name in self.all_initialized() {
            if seen.insert(name.clone()) {
                ordered.push(name);
            }
        }

        ordered
    }

    fn retry_config(&self) -> RetryConfig {
        self.config.retry.clone()
    }

    fn budget_allows(&self, request: &CompletionRequest, model: &ModelDescriptor) -> bool {
        match request.metadata.budget_limit {
            Some(limit) => {
                let estimated_input = crate::cost::estimate_tokens(&request.messages);
                estimate_cost(model, estimated_input, request.max_tokens) <= limit
            }
            None => true,
        }
    }

    fn default_model_for<'a>(&'a self, name: &str, request: &CompletionRequest) -> Option<&'a ModelDescriptor> {
        let adapter = self.adapters.get(name)?;
        match &request.model {
            Some(id) => adapter.get_model(id),
            None => adapter.catalog().default_model(),
        }
    }

    /// Drop candidates whose pre-call cost estimate exceeds `metadata.budgetLimit`.
    /// A skipped candidate is not a failure; it simply never becomes the
    /// "first provider tried" that would flip `fallbackUsed`.
    fn apply_budget_filter(&self, request: &CompletionRequest, candidates: Vec<String>) -> Vec<String> {
        if !self.config.observability.cost_tracking || request.metadata.budget_limit.is_none() {
            return candidates;
        }
        candidates
            .into_iter()
            .filter(|name| {
                self.default_model_for(name, request)
                    .map(|model| self.budget_allows(request, model))
                    .unwrap_or(false)
            })
            .collect()
    }

    async fn fallback_loop<F, Fut>(&self, request: &CompletionRequest, candidates: Vec<String>, mut call: F) -> Result<CompletionResponse>
    where
        F: FnMut(Arc<dyn ProviderAdapter>) -> Fut,
        Fut: std::future::Future<Output = Result<CompletionResponse>>,
    {
        let candidates = self.apply_budget_filter(request, candidates);
        if candidates.is_empty() {
            self.metrics.record_failure();
            return Err(RouterError::invalid_request(
                "router",
                "every candidate provider exceeds the request budget limit",
            ));
        }

        let retry_config = self.retry_config();
        let cancel = CancelToken::new();
        let mut last_error = None;

        for (index, name) in candidates.iter().enumerate() {
            let adapter = match self.adapters.get(name) {
                Some(a) => a.clone(),
                None => continue,
            };

            let attempt_call = &mut call;
            let result = retry::execute(name, &retry_config, &cancel, || attempt_call(adapter.clone())).await;

            match result {
                Ok(mut response) => {
                    response.metadata.fallback_used = index > 0;
                    if index > 0 {
                        response.metadata.fallback_reason = last_error.as_ref().map(|e: &RouterError| e.message.clone());
                    }
                    // A cancelled stream still returns its partial content to the caller, but
                    // it is not a successful terminal outcome: no further
                    // candidates are tried, and health/metrics record it as a failure.
                    if response.finish_reason == FinishReason::Cancelled {
                        self.health.record_failure(name);
                        self.metrics.record_failure();
                    } else {
                        self.health.record_success(name, response.latency_ms);
                        self.metrics
                            .record_success(name, response.usage.total, response.cost.total, response.latency_ms);
                    }
                    return Ok(response);
                }
                Err(err) => {
                    if self.config.observability.logging {
                        debug!(provider = %name, error = %err, "provider attempt failed, trying next");
                    }
                    // Health is tracked per provider, so every failed attempt counts here...
                    self.health.record_failure(name);
                    last_error = Some(err);
                }
            }
        }

        // ...but the Metrics Registry counts per logical request, not per candidate tried:
        // two providers failing in the same fallback chain is one failed request, not two.
        self.metrics.record_failure();
        let last_error = last_error.expect("candidates is non-empty");
        Err(RouterError::aggregate_unavailable(last_error))
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let candidates = self.select_providers(request);
        let for_budget = request.clone();
        let for_closure = request.clone();
        self.fallback_loop(&for_budget, candidates, move |adapter| {
            let request = for_closure.clone();
            async move { adapter.complete(&request).await }
        })
        .await
    }

    /// `cancel` is caller-owned: keep a clone and call [`CancelToken::cancel`] from
    /// another task to stop the stream mid-flight. The adapter returns a partial
    /// response with `finishReason: cancelled` rather than an error.
    pub async fn stream(
        &self,
        request: &CompletionRequest,
        on_chunk: impl FnMut(&str) + Send + Clone + 'static,
        cancel: CancelToken,
    ) -> Result<CompletionResponse> {
        let candidates = self.select_providers(request);
        let for_budget = request.clone();
        let for_closure = request.clone();
        self.fallback_loop(&for_budget, candidates, move |adapter| {
            let request = for_closure.clone();
            let mut on_chunk = on_chunk.clone();
            let cancel = cancel.clone();
            async move { adapter.stream(&request, &mut on_chunk, &cancel).await }
        })
        .await
    }

    /// Vision requests restrict selection to providers with at least one
    /// vision-capable model; an empty subset fails immediately, no retries.
    pub async fn complete_with_vision(
        &self,
        request: &CompletionRequest,
        images: Vec<ImagePart>,
    ) -> Result<CompletionResponse> {
        let all_candidates = self.select_providers(request);
        let vision_candidates: Vec<String> = all_candidates
            .into_iter()
            .filter(|name| {
                self.adapters
                    .get(name)
                    .map(|a| !a.catalog().vision_capable().is_empty())
                    .unwrap_or(false)
            })
            .collect();

        if vision_candidates.is_empty() {
            return Err(RouterError::provider_unavailable(
                "router",
                "no initialized provider has a vision-capable model",
            ));
        }

        let for_budget = request.clone();
        let for_closure = request.clone();
        let images = Arc::new(images);
        self.fallback_loop(&for_budget, vision_candidates, move |adapter| {
            let request = for_closure.clone();
            let images = images.clone();
            async move { adapter.complete_with_vision(&request, &images).await }
        })
        .await
    }

    /// Skips selection and fallback entirely: calls the named adapter through the
    /// Retry Executor only.
    pub async fn complete_with_provider(&self, provider: &str, request: &CompletionRequest) -> Result<CompletionResponse> {
        let adapter = self
            .adapters
            .get(provider)
            .ok_or_else(|| RouterError::provider_unavailable(provider, "not initialized"))?
            .clone();

        let retry_config = self.retry_config();
        let cancel = CancelToken::new();
        let request = request.clone();

        let result = retry::execute(provider, &retry_config, &cancel, || {
            let adapter = adapter.clone();
            let request = request.clone();
            async move { adapter.complete(&request).await }
        })
        .await;

        match result {
            Ok(response) => {
                self.health.record_success(provider, response.latency_ms);
                self.metrics
                    .record_success(provider, response.usage.total, response.cost.total, response.latency_ms);
                Ok(response)
            }
            Err(err) => {
                self.health.record_failure(provider);
                self.metrics.record_failure();
                Err(err)
            }
        }
    }

    pub async fn health_check(&self) -> HashMap<String, bool> {
        let mut results = HashMap::new();
        for (name, adapter) in &self.adapters {
            results.insert(name.clone(), adapter.is_healthy().await);
        }
        results
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    pub fn get_providers(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    pub fn get_models(&self, provider: &str) -> Vec<ModelDescriptor> {
        self.adapters
            .get(provider)
            .map(|a| a.catalog().all().to_vec())
            .unwrap_or_default()
    }

    pub fn get_all_models(&self) -> HashMap<String, Vec<ModelDescriptor>> {
        self.adapters
            .iter()
            .map(|(name, adapter)| (name.clone(), adapter.catalog().all().to_vec()))
            .collect()
    }
}
