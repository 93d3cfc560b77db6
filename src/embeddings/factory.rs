//! Embedding provider factory: detection and creation.

use super::config::{configured_provider, is_embeddings_enabled};
use super::huggingface::HuggingFaceProvider;
use super::model2vec::Model2VecProvider;
use super::ollama::OllamaProvider;
use super::provider::{BoxedProvider, EmbeddingProvider};
use super::types::EmbeddingProviderType;

/// Available provider detection result.
#[derive(Debug, Clone)]
pub struct ProviderDetection {
    /// Names of reachable providers.
    pub available: Vec<String>,
    /// Recommended provider (first available).
    pub recommended: Option<String>,
}

/// Detect which embedding providers are currently reachable.
pub async fn detect_available_providers() -> ProviderDetection {
    let mut available = Vec::new();

    let ollama = OllamaProvider::new();
    if ollama.is_available().await {
        available.push("ollama".to_string());
    }

    if let Some(hf) = HuggingFaceProvider::new() {
        if hf.is_available().await {
            available.push("huggingface".to_string());
        }
    }

    if Model2VecProvider::try_new().is_some() {
        available.push("model2vec".to_string());
    }

    let recommended = available.first().cloned();

    ProviderDetection {
        available,
        recommended,
    }
}

/// Create the active embedding provider.
///
/// Priority:
/// 1. Explicit provider in config/env
/// 2. Auto-detect: Ollama, then HuggingFace, then Model2Vec
///
/// Returns `None` when embeddings are disabled or nothing is reachable.
pub async fn create_embedding_provider() -> Option<BoxedProvider> {
    if !is_embeddings_enabled() {
        return None;
    }

    if let Some(provider_type) = configured_provider() {
        return create_provider_by_type(provider_type).await;
    }

    let ollama = OllamaProvider::new();
    if ollama.is_available().await {
        return Some(BoxedProvider::new(ollama));
    }

    if let Some(hf) = HuggingFaceProvider::new() {
        if hf.is_available().await {
            return Some(BoxedProvider::new(hf));
        }
    }

    Model2VecProvider::try_new().map(BoxedProvider::new)
}

/// Create a specific provider by type.
pub async fn create_provider_by_type(
    provider_type: EmbeddingProviderType,
) -> Option<BoxedProvider> {
    match provider_type {
        EmbeddingProviderType::Ollama => {
            let provider = OllamaProvider::new();
            if provider.is_available().await {
                Some(BoxedProvider::new(provider))
            } else {
                None
            }
        }
        EmbeddingProviderType::Huggingface => HuggingFaceProvider::new().map(BoxedProvider::new),
        EmbeddingProviderType::Model2vec => Model2VecProvider::try_new().map(BoxedProvider::new),
    }
}

/// Create an Ollama provider with explicit configuration (CLI override).
#[must_use]
pub fn create_ollama_provider(endpoint: Option<String>, model: Option<String>) -> BoxedProvider {
    BoxedProvider::new(OllamaProvider::with_config(endpoint, model))
}

/// Create a HuggingFace provider with explicit configuration.
#[must_use]
pub fn create_huggingface_provider(
    endpoint: Option<String>,
    model: Option<String>,
    token: Option<String>,
) -> Option<BoxedProvider> {
    HuggingFaceProvider::with_config(endpoint, model, token).map(BoxedProvider::new)
}
