//! # LLM Routing Runtime
//!
//! An in-process library that dispatches chat-style completion requests across
//! multiple heterogeneous model-provider backends, with transparent fallback,
//! configurable routing policies, and per-request cost and token accounting.
//!
//! No CLI, no persisted state, no file formats: configuration enters through
//! [`RouterConfig`], and all output is via return values and the `on_chunk` callback
//! passed to [`Router::stream`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use llm_router::{CompletionRequest, Message, ProviderConfig, ProviderKind, Router, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RouterConfig::new(vec![
//!         ProviderConfig::new("anthropic", ProviderKind::Anthropic).with_api_key("sk-ant-..."),
//!     ]);
//!     let mut router = Router::new(config);
//!     router.initialize().await?;
//!
//!     let request = CompletionRequest::new(vec![Message::user("hello")]);
//!     let response = router.complete(&request).await?;
//!     println!("{}", response.content);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod complexity;
pub mod config;
pub mod cost;
pub mod default_router;
pub mod error;
pub mod health;
pub mod message;
pub mod metrics;
pub mod model;
pub mod providers;
pub mod request;
pub mod response;
pub mod retry;
pub mod router;
pub mod sse;

pub use config::{ObservabilityConfig, ProviderConfig, ProviderKind, RouterConfig, RoutingStrategy};
pub use default_router::{get_default_router, reset_default_router};
pub use error::{ErrorCode, Result, RouterError};
pub use health::{HealthTracker, ProviderHealth};
pub use message::{ContentPart, ImageMediaType, ImagePart, Message, MessageContent, Role};
pub use metrics::{MetricsRegistry, MetricsSnapshot, ProviderTally};
pub use model::{Capabilities, ComplexityTier, ModelCatalog, ModelDescriptor};
pub use providers::ProviderAdapter;
pub use request::{CompletionRequest, RequestMetadata};
pub use response::{CompletionResponse, CostBreakdown, FinishReason, ResponseMetadata, Usage};
pub use retry::{CancelToken, RetryConfig};
pub use router::Router;

/// Current version of the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Name of the crate.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_matches_cargo_metadata() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
        assert_eq!(NAME, env!("CARGO_PKG_NAME"));
    }
}
