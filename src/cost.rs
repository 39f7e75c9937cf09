//! Cost & Token Accountant.
//!
//! Deliberately approximate and provider-agnostic: routing decisions depend on every
//! adapter producing the same estimate for the same input, so the estimator is a single
//! free function rather than something adapters are allowed to override.

use crate::message::Message;
use crate::model::ModelDescriptor;
use crate::response::{CostBreakdown, Usage};

/// `ceil(total_chars / 4)` across every text part of every message. Images contribute
/// zero tokens to the estimate; the server-reported count overrides this on response.
pub fn estimate_tokens(messages: &[Message]) -> u32 {
    let total_chars: usize = messages.iter().map(|m| m.content.text_len()).sum();
    (total_chars as u32).div_ceil(4).max(if total_chars > 0 { 1 } else { 0 })
}

/// Exact arithmetic cost for a completed request: `(input * input_cost_per_1k +
/// output * output_cost_per_1k) / 1000`.
pub fn calculate_cost(model: &ModelDescriptor, usage: &Usage) -> CostBreakdown {
    let input = (usage.input as f64 / 1000.0) * model.input_cost_per_1k;
    let output = (usage.output as f64 / 1000.0) * model.output_cost_per_1k;
    CostBreakdown::new(input, output)
}

/// Pre-call cost estimate used by the budget check: estimated input tokens at
/// the input rate plus the model's full output budget at the output rate, a conservative
/// upper bound rather than the exact post-call cost.
pub fn estimate_cost(model: &ModelDescriptor, estimated_input_tokens: u32, max_output_tokens: Option<u32>) -> f64 {
    let input_cost = (estimated_input_tokens as f64 / 1000.0) * model.input_cost_per_1k;
    let output_tokens = max_output_tokens.unwrap_or(model.max_output_tokens);
    let output_cost = (output_tokens as f64 / 1000.0) * model.output_cost_per_1k;
    input_cost + output_cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::model::{Capabilities, ComplexityTier};

    fn model() -> ModelDescriptor {
        ModelDescriptor {
            id: "m".into(),
            name: "m".into(),
            context_window: 8192,
            max_output_tokens: 1024,
            input_cost_per_1k: 0.001,
            output_cost_per_1k: 0.002,
            capabilities: Capabilities::default(),
            complexity: ComplexityTier::Simple,
            is_default: true,
        }
    }

    #[test]
    fn estimate_tokens_is_deterministic() {
        let messages = vec![Message::user("hello world")];
        let a = estimate_tokens(&messages);
        let b = estimate_tokens(&messages);
        assert_eq!(a, b);
        assert_eq!(a, 3); // 11 chars -> ceil(11/4) = 3
    }

    #[test]
    fn estimate_tokens_empty_is_zero() {
        assert_eq!(estimate_tokens(&[]), 0);
    }

    #[test]
    fn cost_breakdown_matches_known_rates() {
        // input $0.001/1k, output $0.002/1k, usage {in:2, out:3}.
        let usage = Usage::new(2, 3);
        let cost = calculate_cost(&model(), &usage);
        assert!((cost.input - 0.000002).abs() < 1e-12);
        assert!((cost.output - 0.000006).abs() < 1e-12);
        assert!((cost.total - 0.000008).abs() < 1e-12);
    }

    #[test]
    fn cost_total_is_sum_of_parts() {
        let usage = Usage::new(1000, 500);
        let cost = calculate_cost(&model(), &usage);
        assert_eq!(cost.total, cost.input + cost.output);
    }
}
