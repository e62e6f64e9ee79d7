pub mod classifier;
pub mod knowledge;
pub mod openai;
pub mod openai_compat;
pub mod types;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use classifier::{
    ClassifierError, ClassifierFactory, EmotionClassifier, HuggingFaceClassifier, LazyClassifier,
    OfflineClassifier, DEFAULT_EMOTION_MODEL,
};
pub use knowledge::{clean_query, KnowledgeError, KnowledgeSource, NoKnowledge, WikipediaSummary};
pub use openai::OpenAiProvider;
pub use openai_compat::{custom, groq, ollama, openai};
pub use types::*;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse>;
    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// Provider Configuration
// ============================================================

/// Provider type identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    #[default]
    Groq,
    OpenAI,
    Ollama,
    /// Custom OpenAI-compatible endpoint
    Custom,
}

/// Connection settings for the generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type", default)]
    pub provider_type: ProviderType,
    /// API key (optional for Ollama)
    #[serde(default)]
    pub api_key: Option<String>,
    /// Custom base URL (optional, uses default for each provider type)
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    45
}

impl ProviderConfig {
    pub fn new(provider_type: ProviderType) -> Self {
        Self {
            provider_type,
            api_key: None,
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

/// Create a provider from configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    let timeout = config.timeout_secs;
    let base_url = config.base_url.as_deref();
    let provider: Arc<dyn LlmProvider> = match config.provider_type {
        ProviderType::Groq => {
            let key = config
                .api_key
                .as_ref()
                .ok_or_else(|| anyhow!("groq requires api_key"))?;
            Arc::new(groq(key.clone(), base_url, timeout))
        }
        ProviderType::OpenAI => {
            let key = config
                .api_key
                .as_ref()
                .ok_or_else(|| anyhow!("openai requires api_key"))?;
            Arc::new(openai(key.clone(), base_url, timeout))
        }
        ProviderType::Ollama => Arc::new(ollama(base_url, timeout)),
        ProviderType::Custom => {
            let key = config
                .api_key
                .as_ref()
                .ok_or_else(|| anyhow!("custom provider requires api_key"))?;
            let base_url = base_url.ok_or_else(|| anyhow!("custom provider requires base_url"))?;
            Arc::new(custom(key.clone(), base_url, timeout))
        }
    };
    tracing::info!("created provider {:?}", config.provider_type);
    Ok(provider)
}

/// Offline provider that answers with a fixed, well-formed supportive reply.
pub struct StubProvider;

#[async_trait]
impl LlmProvider for StubProvider {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse> {
        let text = if request.last_user_text().is_some_and(|t| !t.trim().is_empty()) {
            format!(
                "[stub:{}] Thanks for telling me that. I'm here and listening.",
                request.model
            )
        } else {
            String::new()
        };
        Ok(LlmResponse::text(text))
    }
}
