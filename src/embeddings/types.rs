//! Embedding types and configuration structures.

use serde::{Deserialize, Serialize};

/// Embedding provider types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    /// Local Ollama server (HTTP).
    Ollama,
    /// HuggingFace Inference API (HTTP, token).
    Huggingface,
    /// In-process static embeddings (Model2Vec).
    Model2vec,
}

impl std::fmt::Display for EmbeddingProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::Huggingface => write!(f, "huggingface"),
            Self::Model2vec => write!(f, "model2vec"),
        }
    }
}

impl std::str::FromStr for EmbeddingProviderType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "huggingface" | "hf" => Ok(Self::Huggingface),
            "model2vec" => Ok(Self::Model2vec),
            _ => Err(format!("Unknown provider: {s}")),
        }
    }
}

/// Embedding settings stored in `~/.savecontext/config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    pub enabled: Option<bool>,
    pub provider: Option<EmbeddingProviderType>,
    pub hf_token: Option<String>,
    pub hf_model: Option<String>,
    pub hf_endpoint: Option<String>,
    pub ollama_endpoint: Option<String>,
    pub ollama_model: Option<String>,
    pub model2vec_model: Option<String>,
}

/// Provider metadata.
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub name: String,
    pub model: String,
    pub dimensions: usize,
    pub max_chars: usize,
}

/// Model configuration with dimensions and max chars.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub name: String,
    pub dimensions: usize,
    pub max_chars: usize,
}

/// Ollama model configurations.
pub mod ollama_models {
    use super::ModelConfig;

    pub fn nomic_embed_text() -> ModelConfig {
        ModelConfig {
            name: "nomic-embed-text".to_string(),
            dimensions: 768,
            max_chars: 5000,
        }
    }

    pub fn mxbai_embed_large() -> ModelConfig {
        ModelConfig {
            name: "mxbai-embed-large".to_string(),
            dimensions: 1024,
            max_chars: 1500,
        }
    }

    pub fn all_minilm() -> ModelConfig {
        ModelConfig {
            name: "all-minilm".to_string(),
            dimensions: 384,
            max_chars: 800,
        }
    }

    pub fn default_config() -> ModelConfig {
        nomic_embed_text()
    }

    pub fn get_config(model: &str) -> ModelConfig {
        match model {
            "nomic-embed-text" => nomic_embed_text(),
            "mxbai-embed-large" => mxbai_embed_large(),
            "all-minilm" => all_minilm(),
            _ => ModelConfig {
                name: model.to_string(),
                dimensions: 768,
                max_chars: 5000,
            },
        }
    }
}

/// HuggingFace model configurations.
pub mod huggingface_models {
    use super::ModelConfig;

    pub fn all_minilm_l6_v2() -> ModelConfig {
        ModelConfig {
            name: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            dimensions: 384,
            max_chars: 800,
        }
    }

    pub fn all_mpnet_base_v2() -> ModelConfig {
        ModelConfig {
            name: "sentence-transformers/all-mpnet-base-v2".to_string(),
            dimensions: 768,
            max_chars: 1500,
        }
    }

    pub fn default_config() -> ModelConfig {
        all_minilm_l6_v2()
    }

    pub fn get_config(model: &str) -> ModelConfig {
        match model {
            "sentence-transformers/all-MiniLM-L6-v2" => all_minilm_l6_v2(),
            "sentence-transformers/all-mpnet-base-v2" => all_mpnet_base_v2(),
            _ => ModelConfig {
                name: model.to_string(),
                dimensions: 384,
                max_chars: 800,
            },
        }
    }
}

/// Model2Vec model configurations (static embeddings).
pub mod model2vec_models {
    use super::ModelConfig;

    pub fn potion_base_8m() -> ModelConfig {
        ModelConfig {
            name: "minishlab/potion-base-8M".to_string(),
            dimensions: 256,
            max_chars: 2048,
        }
    }

    pub fn potion_base_32m() -> ModelConfig {
        ModelConfig {
            name: "minishlab/potion-base-32M".to_string(),
            dimensions: 256,
            max_chars: 2048,
        }
    }

    pub fn default_config() -> ModelConfig {
        potion_base_8m()
    }

    pub fn get_config(model: &str) -> ModelConfig {
        match model {
            "minishlab/potion-base-8M" | "potion-base-8M" => potion_base_8m(),
            "minishlab/potion-base-32M" | "potion-base-32M" => potion_base_32m(),
            _ => ModelConfig {
                name: model.to_string(),
                dimensions: 256,
                max_chars: 2048,
            },
        }
    }
}
