//! OpenAI-compatible providers (Groq, Ollama, etc.)
//!
//! These providers use the same API format as OpenAI, just with different base URLs.

use crate::OpenAiProvider;

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// Groq API - OpenAI compatible, very fast inference
/// https://console.groq.com/docs/api
pub fn groq(api_key: impl Into<String>, base_url: Option<&str>, timeout_secs: u64) -> OpenAiProvider {
    OpenAiProvider::with_timeout(api_key, base_url.unwrap_or(GROQ_BASE_URL), timeout_secs)
}

pub fn openai(api_key: impl Into<String>, base_url: Option<&str>, timeout_secs: u64) -> OpenAiProvider {
    OpenAiProvider::with_timeout(api_key, base_url.unwrap_or(OPENAI_BASE_URL), timeout_secs)
}

/// Local Ollama server
pub fn ollama(base_url: Option<&str>, timeout_secs: u64) -> OpenAiProvider {
    // Ollama ignores the key, but the header is always sent
    OpenAiProvider::with_timeout("ollama", base_url.unwrap_or(OLLAMA_BASE_URL), timeout_secs)
}

/// Custom OpenAI-compatible endpoint
pub fn custom(
    api_key: impl Into<String>,
    base_url: impl Into<String>,
    timeout_secs: u64,
) -> OpenAiProvider {
    OpenAiProvider::with_timeout(api_key, base_url, timeout_secs)
}
