//! HuggingFace Inference API embedding provider.
//!
//! Uses HuggingFace's hosted inference API. Requires an API token
//! (`HF_TOKEN` or config file).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

use super::config::{resolve_hf_endpoint, resolve_hf_model, resolve_hf_token};
use super::provider::EmbeddingProvider;
use super::types::{huggingface_models, ProviderInfo};

/// HuggingFace Inference API embedding provider.
pub struct HuggingFaceProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    token: String,
    dimensions: usize,
    max_chars: usize,
}

impl HuggingFaceProvider {
    /// Create a provider with resolved settings.
    ///
    /// Returns `None` when no API token is configured.
    #[must_use]
    pub fn new() -> Option<Self> {
        Self::with_config(None, None, None)
    }

    /// Create a provider with explicit configuration.
    ///
    /// Returns `None` when no API token is available.
    #[must_use]
    pub fn with_config(
        endpoint: Option<String>,
        model: Option<String>,
        token: Option<String>,
    ) -> Option<Self> {
        let token = token.or_else(resolve_hf_token)?;
        let endpoint = endpoint.unwrap_or_else(resolve_hf_endpoint);
        let model = model.unwrap_or_else(resolve_hf_model);
        let config = huggingface_models::get_config(&model);

        Some(Self {
            client: reqwest::Client::new(),
            endpoint,
            model,
            token,
            dimensions: config.dimensions,
            max_chars: config.max_chars,
        })
    }
}

/// HuggingFace API request for feature extraction.
#[derive(Debug, Serialize)]
struct HfEmbedRequest<'a> {
    inputs: &'a str,
    options: HfOptions,
}

#[derive(Debug, Serialize)]
struct HfOptions {
    wait_for_model: bool,
}

/// HuggingFace response shapes vary by model pipeline.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HfEmbedResponse {
    /// sentence-transformers return `[[f32; D]]`
    Nested(Vec<Vec<f32>>),
    /// Some pipelines return the vector directly
    Direct(Vec<f32>),
}

impl EmbeddingProvider for HuggingFaceProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "huggingface".to_string(),
            model: self.model.clone(),
            dimensions: self.dimensions,
            max_chars: self.max_chars,
        }
    }

    async fn is_available(&self) -> bool {
        // A live ping would burn rate-limit quota; a token is the gate
        !self.token.is_empty()
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!(
            "{}/models/{}/pipeline/feature-extraction",
            self.endpoint, self.model
        );

        let request = HfEmbedRequest {
            inputs: text,
            options: HfOptions { wait_for_model: true },
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("HuggingFace request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "HuggingFace API error ({status}): {error}"
            )));
        }

        let data: HfEmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse HuggingFace response: {e}")))?;

        match data {
            HfEmbedResponse::Nested(nested) => nested
                .into_iter()
                .next()
                .ok_or_else(|| Error::Embedding("No embeddings in response".into())),
            HfEmbedResponse::Direct(embedding) => Ok(embedding),
        }
    }
}
