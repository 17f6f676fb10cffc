pub mod hashing;
pub mod openai;
pub mod provider;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use hashing::HashingEmbedder;
pub use openai::OpenAiEmbedder;
pub use provider::Embedder;

use crate::analysis::AnalysisError;

pub const DEFAULT_DIMENSION: usize = 1536;
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    #[default]
    Hashing,
    Openai,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingBackend,
    pub dimension: usize,
    pub base_url: String,
    pub model: String,
    /// Resolved key; usually supplied through secrets.yaml
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is not set
    pub api_key_env: Option<String>,
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::default(),
            dimension: DEFAULT_DIMENSION,
            base_url: "https://api.openai.com".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key: None,
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl EmbeddingConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            self.api_key_env
                .as_deref()
                .and_then(|name| std::env::var(name).ok())
                .filter(|value| !value.trim().is_empty())
        })
    }
}

/// Constructs the configured embedder once at startup.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, AnalysisError> {
    match config.provider {
        EmbeddingBackend::Hashing => Ok(Arc::new(HashingEmbedder::new(config.dimension)?)),
        EmbeddingBackend::Openai => Ok(Arc::new(OpenAiEmbedder::new(
            &config.base_url,
            &config.model,
            config.resolved_api_key(),
            config.dimension,
            Duration::from_millis(config.timeout_ms),
        )?)),
    }
}
