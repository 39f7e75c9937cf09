//! Provider Adapter: one implementation per backend wire protocol.

mod anthropic;
mod openai_compatible;

pub use anthropic::AnthropicAdapter;
pub use openai_compatible::{OpenAiCompatibleAdapter, OpenAiCompatibleKind};

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{Result, RouterError};
use crate::message::ImagePart;
use crate::model::ModelCatalog;
use crate::request::CompletionRequest;
use crate::response::CompletionResponse;
use crate::retry::CancelToken;
use async_trait::async_trait;
use std::sync::Arc;

/// Per-backend capability set. Every adapter, regardless of wire protocol, satisfies
/// this boundary; the Router Core only ever talks to `dyn ProviderAdapter`.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn catalog(&self) -> &ModelCatalog;

    fn get_model(&self, id: &str) -> Option<&crate::model::ModelDescriptor> {
        self.catalog().get(id)
    }

    /// Cheap liveness probe; never throws, degrades to `false` on any failure.
    async fn is_healthy(&self) -> bool;

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse>;

    /// Streams text deltas through `on_chunk` in wire order, returning the
    /// accumulated terminal response. Cancellation is observed between chunk reads.
    async fn stream(
        &self,
        request: &CompletionRequest,
        on_chunk: &mut (dyn FnMut(&str) + Send),
        cancel: &CancelToken,
    ) -> Result<CompletionResponse>;

    async fn complete_with_vision(
        &self,
        request: &CompletionRequest,
        images: &[ImagePart],
    ) -> Result<CompletionResponse>;
}

/// Build a concrete adapter for a provider's configured [`ProviderKind`]. Returns an
/// error (never panics) if the backend cannot be reached or its credentials are
/// clearly invalid; the caller is responsible for isolating per-provider init failures.
pub async fn build_adapter(config: &ProviderConfig) -> Result<Arc<dyn ProviderAdapter>> {
    match config.kind {
        ProviderKind::Anthropic => {
            let adapter = AnthropicAdapter::initialize(config).await?;
            Ok(Arc::new(adapter))
        }
        ProviderKind::OpenAi => {
            let adapter =
                OpenAiCompatibleAdapter::initialize(config, OpenAiCompatibleKind::OpenAi).await?;
            Ok(Arc::new(adapter))
        }
        ProviderKind::Groq => {
            let adapter =
                OpenAiCompatibleAdapter::initialize(config, OpenAiCompatibleKind::Groq).await?;
            Ok(Arc::new(adapter))
        }
        ProviderKind::Ollama => {
            let adapter =
                OpenAiCompatibleAdapter::initialize(config, OpenAiCompatibleKind::Ollama).await?;
            Ok(Arc::new(adapter))
        }
    }
}

fn missing_vision_model(provider: &str, model_id: &str) -> RouterError {
    RouterError::invalid_request(
        provider,
        format!("model '{model_id}' does not support vision input"),
    )
}
