use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use rapport_provider::{LlmProvider, LlmRequest};
use rapport_schema::{Policy, RuleId, Signal};
use tokio::time;

use crate::reply::FALLBACK_REPLY;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 1500;
pub const DEFAULT_TIMEOUT_SECS: u64 = 45;

/// System message and token budget sent alongside the composed prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationProfile {
    pub name: &'static str,
    pub system: &'static str,
    pub max_tokens: u32,
}

impl GenerationProfile {
    pub const GRIEF: Self = Self {
        name: "grief",
        system: "User is grieving. Write 3 to 4 medium-long emotionally rich consolation \
                 sentences. Be warm, present, and human. Do NOT ask any questions. Only \
                 comfort and validate.",
        max_tokens: 360,
    };

    pub const DISTRESS: Self = Self {
        name: "distress",
        system: "User is emotionally distressed. Write 3 to 4 medium-long supportive \
                 sentences. Validate feelings first. Include exactly ONE gentle open-ended \
                 question asking what happened or what led to this. Do not ask more than \
                 one question.",
        max_tokens: 340,
    };

    pub const POSITIVE: Self = Self {
        name: "positive",
        system: "User is feeling positive. Write 3 to 4 supportive, upbeat medium-length \
                 sentences. Encouraging and grounded. You MAY include one light \
                 forward-looking question.",
        max_tokens: 260,
    };

    pub const DEFAULT: Self = Self {
        name: "default",
        system: "Write 2 to 3 medium-length friendly conversational sentences.",
        max_tokens: 220,
    };

    pub const SUMMARY: Self = Self {
        name: "summary",
        system: "You write neutral two-line conversation summaries. Do not give advice and \
                 do not ask questions.",
        max_tokens: 120,
    };

    /// Goodbyes never carry a question, so they skip the state fallbacks.
    pub fn for_reply(policy: &Policy, signal: &Signal) -> Self {
        match policy.rule_id {
            RuleId::Goodbye => Self::DEFAULT,
            RuleId::Grief => Self::GRIEF,
            RuleId::Care | RuleId::Crying | RuleId::Injury => Self::DISTRESS,
            RuleId::Hype => Self::POSITIVE,
            _ if signal.overall_state.is_negative() => Self::DISTRESS,
            _ if signal.overall_state.is_positive() => Self::POSITIVE,
            _ => Self::DEFAULT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub model: String,
    pub temperature: f32,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub timeout: Duration,
}

impl GeneratorSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.75,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: Duration::from_millis(DEFAULT_BASE_BACKOFF_MS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Calls the text generation backend with a per-attempt timeout and a bounded
/// number of retries on transient failures. Delay grows linearly with the
/// attempt number.
pub struct ReplyGenerator {
    provider: Arc<dyn LlmProvider>,
    settings: GeneratorSettings,
}

impl ReplyGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: GeneratorSettings) -> Self {
        Self { provider, settings }
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    fn request(&self, profile: &GenerationProfile, prompt: &str) -> LlmRequest {
        LlmRequest::simple(
            self.settings.model.clone(),
            Some(profile.system.to_string()),
            prompt.to_string(),
        )
        .with_max_tokens(profile.max_tokens)
        .with_temperature(self.settings.temperature)
    }

    pub async fn generate(&self, profile: &GenerationProfile, prompt: &str) -> Result<String> {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let call = self.provider.chat(self.request(profile, prompt));
            let err = match time::timeout(self.settings.timeout, call).await {
                Ok(Ok(resp)) => {
                    tracing::debug!(profile = profile.name, attempt, output_tokens = ?resp.output_tokens, "generation succeeded");
                    return Ok(resp.text);
                }
                Ok(Err(err)) => err,
                Err(_) => anyhow!(
                    "generation timed out after {}s [retryable]",
                    self.settings.timeout.as_secs()
                ),
            };

            let err_str = err.to_string();
            if !err_str.contains("[retryable]") || attempt >= max_attempts {
                tracing::warn!(profile = profile.name, attempt, "generation failed: {err_str}");
                return Err(err);
            }

            let backoff = self.settings.base_backoff * attempt;
            tracing::warn!(
                "generation retryable error (attempt {attempt}/{max_attempts}), backing off {}ms: {err_str}",
                backoff.as_millis()
            );
            time::sleep(backoff).await;
        }
    }

    /// Like [`generate`](Self::generate) but never fails: exhaustion yields the
    /// fixed placeholder reply.
    pub async fn generate_or_fallback(&self, profile: &GenerationProfile, prompt: &str) -> String {
        match self.generate(profile, prompt).await {
            Ok(text) => text,
            Err(_) => FALLBACK_REPLY.to_string(),
        }
    }
}
