//! Task complexity inference: heuristic fallback used by the `complexity`
//! routing strategy when the caller does not supply `metadata.taskComplexity`.

use crate::message::Message;
use crate::model::ComplexityTier;

const COMPLEX_LEN_THRESHOLD: usize = 10_000;
const MODERATE_LEN_THRESHOLD: usize = 2_000;

const CODE_TOKENS: &[&str] = &["function", "class ", "import "];
const ANALYSIS_PHRASES: &[&str] = &["analyze", "compare", "explain in detail", "comprehensive"];

/// Infer a [`ComplexityTier`] from message content alone. Callers should prefer an
/// explicit `metadata.taskComplexity` when present; this is the fallback.
pub fn infer(messages: &[Message]) -> ComplexityTier {
    let total_len: usize = messages.iter().map(|m| m.content.text_len()).sum();

    if total_len > COMPLEX_LEN_THRESHOLD || contains_complex_signal(messages) {
        return ComplexityTier::Complex;
    }
    if total_len > MODERATE_LEN_THRESHOLD {
        return ComplexityTier::Moderate;
    }
    ComplexityTier::Simple
}

fn contains_complex_signal(messages: &[Message]) -> bool {
    messages.iter().any(|m| text_has_signal(&m.content.as_flat_text()))
}

fn text_has_signal(text: &str) -> bool {
    if text.contains("```") {
        return true;
    }
    let lower = text.to_lowercase();
    CODE_TOKENS.iter().any(|t| lower.contains(t)) || ANALYSIS_PHRASES.iter().any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn short_plain_text_is_simple() {
        let messages = vec![Message::user("hello there")];
        assert_eq!(infer(&messages), ComplexityTier::Simple);
    }

    #[test]
    fn moderate_length_without_signals() {
        let messages = vec![Message::user(&"a".repeat(3_000))];
        assert_eq!(infer(&messages), ComplexityTier::Moderate);
    }

    #[test]
    fn very_long_text_is_complex_regardless_of_content() {
        let messages = vec![Message::user(&"a".repeat(10_001))];
        assert_eq!(infer(&messages), ComplexityTier::Complex);
    }

    #[test]
    fn fenced_code_block_forces_complex_even_if_short() {
        let messages = vec![Message::user("```rust\nfn main() {}\n```")];
        assert_eq!(infer(&messages), ComplexityTier::Complex);
    }

    #[test]
    fn analysis_phrase_forces_complex() {
        let messages = vec![Message::user("please analyze this dataset")];
        assert_eq!(infer(&messages), ComplexityTier::Complex);
    }

    #[test]
    fn long_text_with_code_fence_is_complex() {
        let mut text = "```\ncode\n```\n".to_string();
        text.push_str(&"x".repeat(15_000));
        let messages = vec![Message::user(&text)];
        assert_eq!(infer(&messages), ComplexityTier::Complex);
    }
}
