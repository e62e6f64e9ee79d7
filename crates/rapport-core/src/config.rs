use std::{fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{anyhow, Context, Result};
use rapport_provider::{ProviderConfig, ProviderType};
use serde::{Deserialize, Serialize};

use crate::router::GeneratorSettings;
use crate::signal::SignalSettings;

fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

fn default_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_temperature() -> f32 {
    0.75
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSection {
    #[serde(rename = "type", default)]
    pub provider_type: ProviderType,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            provider_type: ProviderType::default(),
            api_key_env: default_api_key_env(),
            base_url: None,
            model: default_model(),
            temperature: default_temperature(),
        }
    }
}

impl ProviderSection {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            max_attempts: crate::router::DEFAULT_MAX_ATTEMPTS,
            base_backoff_ms: crate::router::DEFAULT_BASE_BACKOFF_MS,
            timeout_secs: crate::router::DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSection {
    pub enabled: bool,
    /// Inference API base; the model id is appended.
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub api_key_env: String,
    pub top_k: usize,
    pub timeout_secs: u64,
    pub max_init_attempts: u32,
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            model: None,
            api_key_env: "HF_API_TOKEN".to_string(),
            top_k: 3,
            timeout_secs: 10,
            max_init_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeSection {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for KnowledgeSection {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: rapport_provider::knowledge::WIKIPEDIA_REST_BASE_URL.to_string(),
            timeout_secs: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub max_turns: usize,
    pub recent_window: usize,
    pub summary_every: usize,
    pub summary_source_turns: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            max_turns: rapport_memory::DEFAULT_MAX_TURNS,
            recent_window: crate::prompt::DEFAULT_RECENT_WINDOW,
            summary_every: crate::summary::DEFAULT_SUMMARY_EVERY,
            summary_source_turns: crate::summary::DEFAULT_SUMMARY_SOURCE_TURNS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalSection {
    pub short_text_chars: usize,
    pub confidence_threshold: f32,
    pub default_language: String,
}

impl Default for SignalSection {
    fn default() -> Self {
        let defaults = SignalSettings::default();
        Self {
            short_text_chars: defaults.short_text_chars,
            confidence_threshold: defaults.confidence_threshold,
            default_language: defaults.default_language,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RapportConfig {
    #[serde(default)]
    pub provider: ProviderSection,
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub classifier: ClassifierSection,
    #[serde(default)]
    pub knowledge: KnowledgeSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub signal: SignalSection,
    /// Optional YAML file overriding individual lexicon tables.
    #[serde(default)]
    pub lexicon: Option<PathBuf>,
}

impl RapportConfig {
    pub fn signal_settings(&self) -> SignalSettings {
        SignalSettings {
            short_text_chars: self.signal.short_text_chars,
            confidence_threshold: self.signal.confidence_threshold,
            default_language: self.signal.default_language.clone(),
        }
    }

    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            model: self.provider.model.clone(),
            temperature: self.provider.temperature,
            max_attempts: self.generation.max_attempts,
            base_backoff: Duration::from_millis(self.generation.base_backoff_ms),
            timeout: Duration::from_secs(self.generation.timeout_secs),
        }
    }

    /// Provider connection settings with the key resolved from the environment.
    pub fn provider_config(&self) -> ProviderConfig {
        let mut config = ProviderConfig::new(self.provider.provider_type.clone());
        config.api_key = self.provider.api_key();
        config.base_url = self.provider.base_url.clone();
        config.timeout_secs = self.generation.timeout_secs;
        config
    }
}

pub fn validate_config(config: &RapportConfig) -> Result<()> {
    if config.provider.model.trim().is_empty() {
        return Err(anyhow!("provider.model must not be empty"));
    }
    if !(0.0..=2.0).contains(&config.provider.temperature) {
        return Err(anyhow!(
            "provider.temperature must be within 0.0..=2.0, got {}",
            config.provider.temperature
        ));
    }
    if config.generation.max_attempts == 0 {
        return Err(anyhow!("generation.max_attempts must be at least 1"));
    }
    if config.generation.timeout_secs == 0 {
        return Err(anyhow!("generation.timeout_secs must be positive"));
    }
    if !(0.0..=1.0).contains(&config.signal.confidence_threshold) {
        return Err(anyhow!(
            "signal.confidence_threshold must be within 0.0..=1.0, got {}",
            config.signal.confidence_threshold
        ));
    }
    if config.session.max_turns == 0 {
        return Err(anyhow!("session.max_turns must be at least 1"));
    }
    if config.session.recent_window > config.session.max_turns {
        return Err(anyhow!(
            "session.recent_window ({}) exceeds session.max_turns ({})",
            config.session.recent_window,
            config.session.max_turns
        ));
    }
    if config.classifier.enabled && config.classifier.top_k == 0 {
        return Err(anyhow!("classifier.top_k must be at least 1"));
    }
    if matches!(config.provider.provider_type, ProviderType::Custom)
        && config.provider.base_url.is_none()
    {
        return Err(anyhow!("provider.base_url is required for custom providers"));
    }
    Ok(())
}

pub fn load_config(path: &Path) -> Result<RapportConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config: RapportConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse yaml file: {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}
