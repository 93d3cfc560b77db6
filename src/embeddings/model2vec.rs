//! Model2Vec embedding provider.
//!
//! In-process static embeddings: pre-computed word vectors with
//! averaging, no neural inference. Sub-millisecond per embedding, so it
//! works as a zero-dependency fallback when no HTTP provider is up.

use crate::error::{Error, Result};
use model2vec_rs::model::StaticModel;
use std::sync::Arc;

use super::provider::EmbeddingProvider;
use super::types::{model2vec_models, ProviderInfo};

/// Model2Vec embedding provider.
///
/// Loads the model into memory on creation.
pub struct Model2VecProvider {
    model: Arc<StaticModel>,
    model_name: String,
    dimensions: usize,
    max_chars: usize,
}

impl Model2VecProvider {
    /// Create a provider with the default model (potion-base-8M).
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be loaded.
    pub fn new() -> Result<Self> {
        Self::with_model(None)
    }

    /// Create a provider with a custom model.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be loaded.
    pub fn with_model(model_name: Option<String>) -> Result<Self> {
        let model_name = model_name.unwrap_or_else(|| model2vec_models::default_config().name);
        let config = model2vec_models::get_config(&model_name);

        let model = StaticModel::from_pretrained(&model_name, None, None, None).map_err(|e| {
            Error::Embedding(format!("Failed to load Model2Vec model '{model_name}': {e}"))
        })?;

        Ok(Self {
            model: Arc::new(model),
            model_name,
            dimensions: config.dimensions,
            max_chars: config.max_chars,
        })
    }

    /// Try to create a provider, `None` when model loading fails.
    #[must_use]
    pub fn try_new() -> Option<Self> {
        Self::new().ok()
    }
}

impl EmbeddingProvider for Model2VecProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "model2vec".to_string(),
            model: self.model_name.clone(),
            dimensions: self.dimensions,
            max_chars: self.max_chars,
        }
    }

    async fn is_available(&self) -> bool {
        // Local model; constructed means loaded
        true
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let sentences = vec![text.to_string()];
        let embeddings = self.model.encode(&sentences);

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("Model2Vec returned no embeddings".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model2vec_config() {
        let config = model2vec_models::get_config("minishlab/potion-base-8M");
        assert_eq!(config.dimensions, 256);
        assert!(config.max_chars > 0);
    }
}
