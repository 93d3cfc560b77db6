//! Embedding provider trait.
//!
//! Defines the interface all embedding providers implement. Async
//! methods cover the HTTP-based providers; the boxed wrapper gives
//! runtime polymorphism for provider selection.

use super::types::ProviderInfo;
use crate::error::Result;

/// Trait for embedding providers.
pub trait EmbeddingProvider: Send + Sync {
    /// Get provider metadata (name, model, dimensions, max_chars).
    fn info(&self) -> ProviderInfo;

    /// Check if the provider is actually usable right now.
    ///
    /// For Ollama this pings the server and checks the model list; for
    /// HuggingFace it checks the token; Model2Vec is available once
    /// loaded.
    fn is_available(&self) -> impl std::future::Future<Output = bool> + Send;

    /// Generate an embedding for a single text.
    fn generate_embedding(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>>> + Send;

    /// Generate embeddings for multiple texts (batch).
    ///
    /// Default implementation calls `generate_embedding` per text.
    fn generate_embeddings(
        &self,
        texts: &[&str],
    ) -> impl std::future::Future<Output = Result<Vec<Vec<f32>>>> + Send {
        async move {
            let mut results = Vec::with_capacity(texts.len());
            for text in texts {
                results.push(self.generate_embedding(text).await?);
            }
            Ok(results)
        }
    }
}

/// Boxed provider for dynamic dispatch.
///
/// The trait's async methods return `impl Future`, so runtime selection
/// goes through this object-safe wrapper.
pub struct BoxedProvider {
    inner: Box<dyn EmbeddingProviderBoxed + Send + Sync>,
}

/// Object-safe version of `EmbeddingProvider` for boxing.
trait EmbeddingProviderBoxed: Send + Sync {
    fn info(&self) -> ProviderInfo;
    fn is_available_boxed(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + '_>>;
    fn generate_embedding_boxed(
        &self,
        text: &str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>>> + Send + '_>>;
}

impl BoxedProvider {
    /// Box a concrete provider.
    pub fn new<P: EmbeddingProvider + 'static>(provider: P) -> Self {
        Self {
            inner: Box::new(BoxedProviderWrapper(provider)),
        }
    }

    /// Get provider metadata.
    #[must_use]
    pub fn info(&self) -> ProviderInfo {
        self.inner.info()
    }

    /// Check if the provider is available.
    pub async fn is_available(&self) -> bool {
        self.inner.is_available_boxed().await
    }

    /// Generate an embedding for a single text.
    pub async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.generate_embedding_boxed(text).await
    }
}

struct BoxedProviderWrapper<P: EmbeddingProvider + 'static>(P);

impl<P: EmbeddingProvider + 'static> EmbeddingProviderBoxed for BoxedProviderWrapper<P> {
    fn info(&self) -> ProviderInfo {
        self.0.info()
    }

    fn is_available_boxed(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + '_>> {
        Box::pin(self.0.is_available())
    }

    fn generate_embedding_boxed(
        &self,
        text: &str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>>> + Send + '_>> {
        // Owned copy so the returned future doesn't borrow the argument.
        let text_owned = text.to_string();
        Box::pin(async move { self.0.generate_embedding(&text_owned).await })
    }
}
