use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::{LlmMessage, LlmProvider, LlmRequest, LlmResponse};

const DEFAULT_TIMEOUT_SECS: u64 = 45;

/// Chat-completions client for OpenAI and every OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderErrorKind {
    RateLimit,
    ServerError,
    Timeout,
    AuthError,
    InvalidRequest,
    Unknown,
}

impl ProviderErrorKind {
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        match status.as_u16() {
            429 => Self::RateLimit,
            408 => Self::Timeout,
            401 | 403 => Self::AuthError,
            400 | 422 => Self::InvalidRequest,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit | Self::ServerError | Self::Timeout)
    }
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self::with_timeout(api_key, api_base, DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_timeout(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            timeout_secs,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub(crate) fn to_api_request(request: LlmRequest) -> ApiRequest {
        ApiRequest {
            model: request.model,
            messages: to_api_messages(request.system, request.messages),
            max_tokens: Some(request.max_tokens),
            temperature: request.temperature,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.api_base);
        let payload = Self::to_api_request(request);

        let resp = match self
            .client
            .post(url)
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Err(anyhow!(
                    "openai api error (timeout) [retryable]: request timed out after {}s",
                    self.timeout_secs
                ));
            }
            Err(e) if e.is_connect() => {
                return Err(anyhow!("openai api error (connect) [retryable]: {e}"));
            }
            Err(e) => return Err(e.into()),
        };

        let status = resp.status();
        if status != StatusCode::OK {
            let text = resp.text().await?;
            let parsed = serde_json::from_str::<ApiErrorEnvelope>(&text).ok();
            return Err(format_api_error(status, parsed));
        }

        let body: ApiResponse = resp.json().await?;
        to_llm_response(body)
    }
}

fn to_api_messages(system: Option<String>, messages: Vec<LlmMessage>) -> Vec<ApiMessage> {
    let mut result = Vec::with_capacity(messages.len() + 1);

    if let Some(system_text) = system {
        result.push(ApiMessage {
            role: "system".to_string(),
            content: system_text,
        });
    }

    result.extend(
        messages
            .into_iter()
            .filter(|m| !m.content.is_empty())
            .map(|m| ApiMessage {
                role: m.role,
                content: m.content,
            }),
    );

    result
}

fn to_llm_response(body: ApiResponse) -> Result<LlmResponse> {
    let choice = body
        .choices
        .first()
        .ok_or_else(|| anyhow!("openai api error: empty choices"))?;

    let text = choice
        .message
        .content
        .as_deref()
        .unwrap_or_default()
        .trim()
        .to_string();

    Ok(LlmResponse {
        text,
        input_tokens: body.usage.as_ref().map(|u| u.prompt_tokens),
        output_tokens: body.usage.as_ref().map(|u| u.completion_tokens),
        stop_reason: normalize_finish_reason(choice.finish_reason.clone()),
    })
}

fn normalize_finish_reason(reason: Option<String>) -> Option<String> {
    match reason.as_deref() {
        Some("stop") => Some("end_turn".to_string()),
        Some("length") => Some("max_tokens".to_string()),
        _ => reason,
    }
}

fn format_api_error(status: StatusCode, parsed: Option<ApiErrorEnvelope>) -> anyhow::Error {
    let kind = ProviderErrorKind::from_status(status);
    let retryable = if kind.is_retryable() {
        " [retryable]"
    } else {
        ""
    };
    if let Some(api_error) = parsed {
        anyhow!(
            "openai api error ({status}){retryable}: {} ({})",
            api_error.error.message,
            api_error.error.r#type
        )
    } else {
        anyhow!("openai api error ({status}){retryable}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiRequest {
    pub model: String,
    pub messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiResponse {
    pub choices: Vec<ApiChoice>,
    #[serde(default)]
    pub usage: Option<ApiUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiChoice {
    pub message: ApiAssistantMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiAssistantMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(rename = "type", default)]
    pub r#type: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn to_api_request_includes_system_as_first_message() {
        let req = LlmRequest::simple("llama".into(), Some("be warm".into()), "hi".into())
            .with_temperature(0.75);
        let api = OpenAiProvider::to_api_request(req);
        assert_eq!(api.messages[0].role, "system");
        assert_eq!(api.messages[0].content, "be warm");
        assert_eq!(api.messages[1].role, "user");
        assert_eq!(api.temperature, Some(0.75));
    }

    #[test]
    fn to_api_request_skips_empty_messages() {
        let mut req = LlmRequest::simple("llama".into(), None, "hi".into());
        req.messages.push(LlmMessage::assistant(""));
        let api = OpenAiProvider::to_api_request(req);
        assert_eq!(api.messages.len(), 1);
    }

    #[test]
    fn api_response_text_is_trimmed() {
        let raw = serde_json::json!({
            "choices": [{
                "message": {"content": "  hello there.  "},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        });
        let parsed: ApiResponse = serde_json::from_value(raw).unwrap();
        let resp = to_llm_response(parsed).unwrap();
        assert_eq!(resp.text, "hello there.");
        assert_eq!(resp.stop_reason.as_deref(), Some("end_turn"));
        assert_eq!(resp.input_tokens, Some(12));
    }

    #[test]
    fn empty_choices_is_an_error() {
        let parsed: ApiResponse =
            serde_json::from_value(serde_json::json!({"choices": []})).unwrap();
        assert!(to_llm_response(parsed).is_err());
    }

    #[test]
    fn format_api_error_retryable_for_429_and_5xx() {
        let err = format_api_error(
            StatusCode::TOO_MANY_REQUESTS,
            Some(ApiErrorEnvelope {
                error: ApiErrorBody {
                    r#type: "rate_limit_error".into(),
                    message: "too many requests".into(),
                },
            }),
        );
        assert!(err.to_string().contains("[retryable]"));
        let err = format_api_error(StatusCode::BAD_GATEWAY, None);
        assert!(err.to_string().contains("[retryable]"));
    }

    #[test]
    fn format_api_error_not_retryable_for_401() {
        let err = format_api_error(StatusCode::UNAUTHORIZED, None);
        assert!(!err.to_string().contains("[retryable]"));
    }

    #[tokio::test]
    async fn chat_posts_to_completions_with_bearer_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "That sounds heavy."}, "finish_reason": "stop"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("test-key", server.uri());
        let resp = provider
            .chat(LlmRequest::simple("llama".into(), None, "hi".into()))
            .await
            .unwrap();
        assert_eq!(resp.text, "That sounds heavy.");
    }

    #[tokio::test]
    async fn chat_marks_server_errors_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "error": {"type": "overloaded", "message": "try later"}
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("test-key", server.uri());
        let err = provider
            .chat(LlmRequest::simple("llama".into(), None, "hi".into()))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("[retryable]"));
        assert!(msg.contains("try later"));
    }
}
