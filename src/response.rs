//! Completion response, usage, and cost breakdown.

use serde::{Deserialize, Serialize};

/// Neutral finish reason translated from the provider's native terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Error,
    Cancelled,
}

/// Token usage for a single request. `total` is always `input + output`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input: u32,
    pub output: u32,
    pub total: u32,
}

impl Usage {
    pub fn new(input: u32, output: u32) -> Self {
        Self {
            input,
            output,
            total: input + output,
        }
    }
}

/// USD cost breakdown. `total` is always `input + output`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input: f64,
    pub output: f64,
    pub total: f64,
}

impl CostBreakdown {
    pub fn new(input: f64, output: f64) -> Self {
        Self {
            input,
            output,
            total: input + output,
        }
    }

    pub const CURRENCY: &'static str = "USD";
}

/// Non-wire-affecting facts about how the response was produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMetadata {
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub fallback_used: bool,
    pub fallback_reason: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

/// The result of a completed (non-streaming) or fully-drained (streaming) request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub provider: String,
    pub usage: Usage,
    pub cost: CostBreakdown,
    pub latency_ms: u64,
    pub finish_reason: FinishReason,
    pub metadata: ResponseMetadata,
}
