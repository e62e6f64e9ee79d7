use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub const WIKIPEDIA_REST_BASE_URL: &str = "https://en.wikipedia.org/api/rest_v1";

const DEFAULT_TIMEOUT_SECS: u64 = 6;
const MAX_QUERY_WORDS: usize = 5;
const FILLER_WORDS: &[&str] = &[
    "is", "was", "are", "the", "a", "movie", "film", "song", "very", "so", "really",
];

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("knowledge lookup request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("knowledge lookup returned status {0}")]
    Status(u16),
    #[error("invalid knowledge base url: {0}")]
    InvalidUrl(String),
}

#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Short background snippet for `query`, or an empty string when nothing matched.
    async fn lookup(&self, query: &str) -> Result<String, KnowledgeError>;
}

/// Lowercases, drops filler words and keeps the first few words.
pub fn clean_query(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .filter(|w| !FILLER_WORDS.contains(w))
        .take(MAX_QUERY_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Page-summary lookup against the Wikipedia REST API.
#[derive(Debug, Clone)]
pub struct WikipediaSummary {
    client: reqwest::Client,
    base_url: String,
}

impl Default for WikipediaSummary {
    fn default() -> Self {
        Self::new(WIKIPEDIA_REST_BASE_URL, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

impl WikipediaSummary {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn summary_url(&self, title: &str) -> Result<reqwest::Url, KnowledgeError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| KnowledgeError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| KnowledgeError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["page", "summary", title]);
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    extract: String,
}

#[async_trait]
impl KnowledgeSource for WikipediaSummary {
    async fn lookup(&self, query: &str) -> Result<String, KnowledgeError> {
        let cleaned = clean_query(query);
        if cleaned.is_empty() {
            return Ok(String::new());
        }
        let title = cleaned.replace(' ', "_");
        let url = self.summary_url(&title)?;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(String::new());
        }
        if !status.is_success() {
            return Err(KnowledgeError::Status(status.as_u16()));
        }

        let body: SummaryResponse = response.json().await?;
        Ok(body.extract.trim().to_string())
    }
}

/// Knowledge source that never finds anything.
pub struct NoKnowledge;

#[async_trait]
impl KnowledgeSource for NoKnowledge {
    async fn lookup(&self, _query: &str) -> Result<String, KnowledgeError> {
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn clean_query_drops_filler_and_caps_words() {
        assert_eq!(clean_query("The Matrix movie is so good"), "matrix good");
        assert_eq!(
            clean_query("one two three four five six seven"),
            "one two three four five"
        );
        assert_eq!(clean_query("   "), "");
    }

    #[tokio::test]
    async fn lookup_returns_extract() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page/summary/inception"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "title": "Inception",
                "extract": "Inception is a 2010 science fiction film."
            })))
            .mount(&server)
            .await;

        let source = WikipediaSummary::new(server.uri(), Duration::from_secs(2));
        let snippet = source.lookup("Inception movie").await.unwrap();
        assert_eq!(snippet, "Inception is a 2010 science fiction film.");
    }

    #[tokio::test]
    async fn lookup_not_found_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = WikipediaSummary::new(server.uri(), Duration::from_secs(2));
        assert_eq!(source.lookup("nothing here").await.unwrap(), "");
    }

    #[tokio::test]
    async fn lookup_server_error_is_typed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let source = WikipediaSummary::new(server.uri(), Duration::from_secs(2));
        let err = source.lookup("rust language").await.unwrap_err();
        assert!(matches!(err, KnowledgeError::Status(500)));
    }

    #[tokio::test]
    async fn no_knowledge_is_always_empty() {
        assert_eq!(NoKnowledge.lookup("who is anyone").await.unwrap(), "");
    }
}
