//! Model descriptors and the frozen per-provider catalog.

use serde::{Deserialize, Serialize};

/// Task complexity tier, either declared by the caller or inferred (see [`crate::complexity`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityTier {
    Simple,
    Moderate,
    Complex,
    Expert,
}

/// Capability bits declared by a model descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub vision: bool,
    pub streaming: bool,
    pub functions: bool,
}

/// Immutable-per-process model metadata: pricing, context window, and capability bits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    pub context_window: u32,
    pub max_output_tokens: u32,
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
    pub capabilities: Capabilities,
    pub complexity: ComplexityTier,
    #[serde(default)]
    pub is_default: bool,
}

/// A provider's frozen model table, populated once at adapter initialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelCatalog {
    models: Vec<ModelDescriptor>,
}

impl ModelCatalog {
    pub fn new(models: Vec<ModelDescriptor>) -> Self {
        Self { models }
    }

    pub fn all(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == id)
    }

    /// The model flagged `is_default`, or the first entry if none is flagged.
    pub fn default_model(&self) -> Option<&ModelDescriptor> {
        self.models
            .iter()
            .find(|m| m.is_default)
            .or_else(|| self.models.first())
    }

    pub fn vision_capable(&self) -> Vec<&ModelDescriptor> {
        self.models.iter().filter(|m| m.capabilities.vision).collect()
    }

    pub fn by_complexity(&self, tier: ComplexityTier) -> Vec<&ModelDescriptor> {
        self.models.iter().filter(|m| m.complexity == tier).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str, is_default: bool, vision: bool) -> ModelDescriptor {
        ModelDescriptor {
            id: id.to_string(),
            name: id.to_string(),
            context_window: 8192,
            max_output_tokens: 1024,
            input_cost_per_1k: 0.001,
            output_cost_per_1k: 0.002,
            capabilities: Capabilities {
                vision,
                streaming: true,
                functions: false,
            },
            complexity: ComplexityTier::Moderate,
            is_default,
        }
    }

    #[test]
    fn default_model_prefers_flagged_entry() {
        let catalog = ModelCatalog::new(vec![model("a", false, false), model("b", true, false)]);
        assert_eq!(catalog.default_model().unwrap().id, "b");
    }

    #[test]
    fn default_model_falls_back_to_first() {
        let catalog = ModelCatalog::new(vec![model("a", false, false), model("b", false, false)]);
        assert_eq!(catalog.default_model().unwrap().id, "a");
    }

    #[test]
    fn vision_capable_filters() {
        let catalog = ModelCatalog::new(vec![model("a", false, false), model("b", false, true)]);
        let vision = catalog.vision_capable();
        assert_eq!(vision.len(), 1);
        assert_eq!(vision[0].id, "b");
    }
}
