//! Completion request and its per-call metadata hints.

use crate::message::Message;
use crate::model::ComplexityTier;
use serde::{Deserialize, Serialize};

/// Per-request hints that influence routing but never change the wire payload itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// Declared task complexity; if absent the complexity strategy infers one.
    pub task_complexity: Option<ComplexityTier>,
    /// Restricts selection to vision-capable providers when `true`.
    #[serde(default)]
    pub requires_vision: bool,
    /// Forces this provider first, followed by the fallback chain minus itself.
    pub preferred_provider: Option<String>,
    /// USD cap on the pre-call cost estimate for any candidate provider.
    pub budget_limit: Option<f64>,
    /// Advisory latency target in milliseconds; biases adaptive scoring only.
    pub latency_target_ms: Option<u64>,
}

/// A neutral chat completion request. Absent fields fall back to provider defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub metadata: RequestMetadata,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            model: None,
            provider: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            stop_sequences: None,
            stream: false,
            metadata: RequestMetadata::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Total character length across every text part of every message, used by both the
    /// token estimator and the complexity heuristic.
    pub fn total_text_len(&self) -> usize {
        self.messages.iter().map(|m| m.content.text_len()).sum()
    }
}
