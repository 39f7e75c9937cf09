//! Process-wide default router singleton. Lazily created on first
//! [`get_default_router`] from whichever provider API keys are present in the
//! environment, plus a local inference server that needs no credentials at all.
//! Backed by an [`ArcSwapOption`] rather than a one-shot cell so
//! [`reset_default_router`] can genuinely re-arm lazy creation between tests.

use crate::config::{ProviderConfig, ProviderKind, RouterConfig};
use crate::error::{Result, RouterError};
use crate::router::Router;
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tokio::sync::RwLock;

const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

static DEFAULT_ROUTER: ArcSwapOption<RwLock<Router>> = ArcSwapOption::const_empty();

/// Reads `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, `GROQ_API_KEY` and configures one
/// provider per credential present, in the documented default priority order
/// (1 = Anthropic, 2 = OpenAI, 5 = Groq). The local Ollama server needs no
/// credentials, so it is always added — using `OLLAMA_BASE_URL` when set, falling
/// back to `http://localhost:11434` otherwise — as priority 10, local and
/// last-resort.
fn config_from_env() -> RouterConfig {
    let mut providers = Vec::new();

    if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        providers.push(
            ProviderConfig::new("anthropic", ProviderKind::Anthropic)
                .with_api_key(key)
                .with_priority(1),
        );
    }
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        providers.push(
            ProviderConfig::new("openai", ProviderKind::OpenAi)
                .with_api_key(key)
                .with_priority(2),
        );
    }
    if let Ok(key) = std::env::var("GROQ_API_KEY") {
        providers.push(
            ProviderConfig::new("groq", ProviderKind::Groq)
                .with_api_key(key)
                .with_priority(5),
        );
    }

    let ollama_base_url =
        std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| DEFAULT_OLLAMA_BASE_URL.to_string());
    providers.push(
        ProviderConfig::new("ollama", ProviderKind::Ollama)
            .with_base_url(ollama_base_url)
            .with_priority(10),
    );

    RouterConfig::new(providers)
}

/// Lazily creates and initializes the process-wide router on first call. Subsequent
/// calls return the same instance until [`reset_default_router`] clears it.
pub async fn get_default_router() -> Result<Arc<RwLock<Router>>> {
    if let Some(existing) = DEFAULT_ROUTER.load_full() {
        return Ok(existing);
    }

    let config = config_from_env();
    if config.providers.is_empty() {
        return Err(RouterError::provider_unavailable(
            "default_router",
            "no provider credentials found in the environment",
        ));
    }

    let mut router = Router::new(config);
    router.initialize().await?;
    let router = Arc::new(RwLock::new(router));
    DEFAULT_ROUTER.store(Some(router.clone()));
    Ok(router)
}

/// Clears the singleton so the next [`get_default_router`] call rebuilds it from
/// the environment as it stands then. Tests that mutate provider env vars between
/// cases must call this first, or they'll observe a router built for a previous
/// case's environment.
pub fn reset_default_router() {
    DEFAULT_ROUTER.store(None);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_env_always_includes_local_ollama() {
        for var in ["ANTHROPIC_API_KEY", "OPENAI_API_KEY", "GROQ_API_KEY", "OLLAMA_BASE_URL"] {
            std::env::remove_var(var);
        }
        let config = config_from_env();
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].name, "ollama");
        assert_eq!(config.providers[0].base_url.as_deref(), Some(DEFAULT_OLLAMA_BASE_URL));
    }

    #[test]
    fn config_from_env_respects_priority_order() {
        std::env::set_var("ANTHROPIC_API_KEY", "sk-ant-test");
        std::env::set_var("OLLAMA_BASE_URL", "http://localhost:11434");
        let config = config_from_env();
        std::env::remove_var("ANTHROPIC_API_KEY");
        std::env::remove_var("OLLAMA_BASE_URL");

        assert_eq!(config.providers.len(), 2);
        let anthropic = config.providers.iter().find(|p| p.name == "anthropic").unwrap();
        let ollama = config.providers.iter().find(|p| p.name == "ollama").unwrap();
        assert!(anthropic.priority < ollama.priority);
    }

    #[test]
    fn reset_default_router_clears_the_singleton() {
        DEFAULT_ROUTER.store(None);
        assert!(DEFAULT_ROUTER.load_full().is_none());
        reset_default_router();
        assert!(DEFAULT_ROUTER.load_full().is_none());
    }
}
