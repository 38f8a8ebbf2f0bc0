//! Model metadata: which input modalities a completion model accepts.

use std::collections::HashMap;

use crate::message::Modality;

/// Lookup of model capabilities.
pub trait ModelCatalog: Send + Sync {
    /// Input modalities the model accepts.
    fn modalities(&self, model_id: &str) -> Vec<Modality>;

    fn supports(&self, model_id: &str, modality: Modality) -> bool {
        modality == Modality::Text || self.modalities(model_id).contains(&modality)
    }
}

/// A catalog built from configuration.
///
/// Unknown models fall back to `fallback` (text and image unless configured).
#[derive(Debug, Clone)]
pub struct StaticModelCatalog {
    models: HashMap<String, Vec<Modality>>,
    fallback: Vec<Modality>,
}

impl StaticModelCatalog {
    pub fn new(models: HashMap<String, Vec<Modality>>) -> Self {
        Self {
            models,
            fallback: vec![Modality::Text, Modality::Image],
        }
    }

    pub fn with_fallback(mut self, fallback: Vec<Modality>) -> Self {
        self.fallback = fallback;
        self
    }
}

impl Default for StaticModelCatalog {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl ModelCatalog for StaticModelCatalog {
    fn modalities(&self, model_id: &str) -> Vec<Modality> {
        self.models
            .get(model_id)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_model_wins_over_fallback() {
        let mut models = HashMap::new();
        models.insert(
            "gemini".to_string(),
            vec![Modality::Text, Modality::Image, Modality::Audio, Modality::Video],
        );
        models.insert("text-only".to_string(), vec![Modality::Text]);
        let catalog = StaticModelCatalog::new(models);

        assert!(catalog.supports("gemini", Modality::Video));
        assert!(!catalog.supports("text-only", Modality::Image));
        assert!(catalog.supports("unknown", Modality::Image));
        assert!(!catalog.supports("unknown", Modality::Audio));
    }

    #[test]
    fn text_is_always_supported() {
        let catalog = StaticModelCatalog::default().with_fallback(vec![]);
        assert!(catalog.supports("anything", Modality::Text));
    }
}
