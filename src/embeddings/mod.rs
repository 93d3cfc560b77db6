//! Embedding generation for semantic search.
//!
//! Providers:
//! - **Ollama** (local HTTP) - recommended for development
//! - **HuggingFace** (remote HTTP) - requires an API token
//! - **Model2Vec** (in-process static model) - zero-dependency fallback
//!
//! The [`pipeline`] module owns the lifecycle: generate-on-save,
//! startup dimension reconciliation, and background backfill. Settings
//! load from `~/.savecontext/config.json`; environment variables
//! (`OLLAMA_ENDPOINT`, `OLLAMA_MODEL`, `HF_TOKEN`, `HF_MODEL`,
//! `SAVECONTEXT_EMBEDDINGS_ENABLED`) take precedence.

pub mod chunking;
pub mod config;
pub mod factory;
pub mod huggingface;
pub mod model2vec;
pub mod ollama;
pub mod pipeline;
pub mod provider;
pub mod types;

pub use chunking::{chunk_text, prepare_item_text, TextChunk};
pub use config::{
    get_embedding_settings, is_embeddings_enabled, load_config, reset_embedding_settings,
    save_config, save_embedding_settings, SaveContextConfig,
};
pub use factory::{
    create_embedding_provider, create_huggingface_provider, create_ollama_provider,
    create_provider_by_type, detect_available_providers, ProviderDetection,
};
pub use huggingface::HuggingFaceProvider;
pub use model2vec::Model2VecProvider;
pub use ollama::OllamaProvider;
pub use pipeline::{EmbeddingPipeline, SharedStorage};
pub use provider::{BoxedProvider, EmbeddingProvider};
pub use types::{EmbeddingProviderType, EmbeddingSettings, ModelConfig, ProviderInfo};
