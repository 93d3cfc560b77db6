//! Embedding configuration management.
//!
//! Loads and saves embedding settings from `~/.savecontext/config.json`.
//! Environment variables take precedence over the config file.

use crate::config::config_file_path;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;

use super::types::{EmbeddingProviderType, EmbeddingSettings};

/// SaveContext local configuration file structure.
///
/// Stored at `~/.savecontext/config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveContextConfig {
    pub embeddings: Option<EmbeddingSettings>,
    /// Remote sync endpoint, when configured.
    pub sync_url: Option<String>,
}

/// Load the full SaveContext configuration.
pub fn load_config() -> Result<SaveContextConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        return Ok(SaveContextConfig::default());
    }

    let content = fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
}

/// Save the full SaveContext configuration.
pub fn save_config(config: &SaveContextConfig) -> Result<()> {
    let path = config_file_path()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

    fs::write(&path, content)
        .map_err(|e| Error::Config(format!("Failed to write config file: {e}")))?;

    Ok(())
}

/// Get embedding settings from the config file.
pub fn get_embedding_settings() -> Result<Option<EmbeddingSettings>> {
    Ok(load_config()?.embeddings)
}

/// Save embedding settings (merges with existing config).
pub fn save_embedding_settings(settings: &EmbeddingSettings) -> Result<()> {
    let mut config = load_config()?;

    let existing = config.embeddings.unwrap_or_default();
    config.embeddings = Some(EmbeddingSettings {
        enabled: settings.enabled.or(existing.enabled),
        provider: settings.provider.or(existing.provider),
        hf_token: settings.hf_token.clone().or(existing.hf_token),
        hf_model: settings.hf_model.clone().or(existing.hf_model),
        hf_endpoint: settings.hf_endpoint.clone().or(existing.hf_endpoint),
        ollama_endpoint: settings.ollama_endpoint.clone().or(existing.ollama_endpoint),
        ollama_model: settings.ollama_model.clone().or(existing.ollama_model),
        model2vec_model: settings.model2vec_model.clone().or(existing.model2vec_model),
    });

    save_config(&config)
}

/// Reset embedding settings (removes them from the config file).
pub fn reset_embedding_settings() -> Result<()> {
    let mut config = load_config()?;
    config.embeddings = None;
    save_config(&config)
}

/// The explicitly configured provider, if any.
pub fn configured_provider() -> Option<EmbeddingProviderType> {
    if let Ok(value) = std::env::var("SAVECONTEXT_EMBEDDINGS_PROVIDER") {
        if let Ok(p) = value.parse() {
            return Some(p);
        }
    }
    get_embedding_settings().ok().flatten()?.provider
}

/// Resolve Ollama endpoint from env, config, or default.
pub fn resolve_ollama_endpoint() -> String {
    if let Ok(endpoint) = std::env::var("OLLAMA_ENDPOINT") {
        if !endpoint.is_empty() {
            return endpoint;
        }
    }

    if let Ok(Some(settings)) = get_embedding_settings() {
        if let Some(endpoint) = settings.ollama_endpoint {
            return endpoint;
        }
    }

    "http://localhost:11434".to_string()
}

/// Resolve Ollama model from env, config, or default.
pub fn resolve_ollama_model() -> String {
    if let Ok(model) = std::env::var("OLLAMA_MODEL") {
        if !model.is_empty() {
            return model;
        }
    }

    if let Ok(Some(settings)) = get_embedding_settings() {
        if let Some(model) = settings.ollama_model {
            return model;
        }
    }

    "nomic-embed-text".to_string()
}

/// Resolve HuggingFace token from env or config.
pub fn resolve_hf_token() -> Option<String> {
    if let Ok(token) = std::env::var("HF_TOKEN") {
        if !token.is_empty() {
            return Some(token);
        }
    }

    get_embedding_settings().ok().flatten()?.hf_token
}

/// Resolve HuggingFace model from env, config, or default.
pub fn resolve_hf_model() -> String {
    if let Ok(model) = std::env::var("HF_MODEL") {
        if !model.is_empty() {
            return model;
        }
    }

    if let Ok(Some(settings)) = get_embedding_settings() {
        if let Some(model) = settings.hf_model {
            return model;
        }
    }

    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

/// Resolve HuggingFace endpoint from env, config, or default.
pub fn resolve_hf_endpoint() -> String {
    if let Ok(endpoint) = std::env::var("HF_ENDPOINT") {
        if !endpoint.is_empty() {
            return endpoint;
        }
    }

    if let Ok(Some(settings)) = get_embedding_settings() {
        if let Some(endpoint) = settings.hf_endpoint {
            return endpoint;
        }
    }

    "https://router.huggingface.co/hf-inference".to_string()
}

/// Check if embeddings are enabled.
pub fn is_embeddings_enabled() -> bool {
    if let Ok(enabled) = std::env::var("SAVECONTEXT_EMBEDDINGS_ENABLED") {
        return enabled != "false" && enabled != "0";
    }

    if let Ok(Some(settings)) = get_embedding_settings() {
        return settings.enabled.unwrap_or(true);
    }

    true
}
