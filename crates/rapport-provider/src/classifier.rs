//! Emotion classification backends.
//!
//! The core only sees [`EmotionClassifier`]. Remote handles are wrapped in a
//! [`LazyClassifier`] so construction happens on first use, is retried a
//! bounded number of times, and then sticks to "unavailable".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rapport_schema::EmotionScore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

pub const DEFAULT_EMOTION_MODEL: &str = "j-hartmann/emotion-english-distilroberta-base";
pub const HF_INFERENCE_BASE_URL: &str = "https://api-inference.huggingface.co";

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("emotion classifier unavailable: {0}")]
    Unavailable(String),
    #[error("emotion classifier request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("emotion classifier returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("emotion classifier returned a malformed payload: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    /// Ranked labels, best first.
    async fn classify(&self, text: &str) -> Result<Vec<EmotionScore>, ClassifierError>;
    fn model_id(&self) -> &str;
}

/// Hugging Face inference API text-classification endpoint.
#[derive(Clone)]
pub struct HuggingFaceClassifier {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    top_k: usize,
}

impl HuggingFaceClassifier {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: HF_INFERENCE_BASE_URL.to_string(),
            api_key,
            model: DEFAULT_EMOTION_MODEL.to_string(),
            top_k: 3,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: InferenceParameters,
}

#[derive(Debug, Serialize)]
struct InferenceParameters {
    top_k: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct InferenceLabel {
    label: String,
    score: f32,
}

/// The endpoint answers `[[...]]` for single inputs on some deployments and
/// `[...]` on others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Nested(Vec<Vec<InferenceLabel>>),
    Flat(Vec<InferenceLabel>),
}

impl InferenceResponse {
    fn into_ranking(self, top_k: usize) -> Vec<EmotionScore> {
        let labels = match self {
            Self::Nested(mut batches) => {
                if batches.is_empty() {
                    Vec::new()
                } else {
                    batches.swap_remove(0)
                }
            }
            Self::Flat(labels) => labels,
        };
        let mut ranking: Vec<EmotionScore> = labels
            .into_iter()
            .map(|l| EmotionScore::new(l.label.to_lowercase(), l.score))
            .collect();
        ranking.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranking.truncate(top_k);
        ranking
    }
}

#[async_trait]
impl EmotionClassifier for HuggingFaceClassifier {
    async fn classify(&self, text: &str) -> Result<Vec<EmotionScore>, ClassifierError> {
        let endpoint = format!("{}/models/{}", self.base_url, self.model);
        let request = InferenceRequest {
            inputs: text,
            parameters: InferenceParameters { top_k: self.top_k },
        };

        let mut builder = self.client.post(endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: InferenceResponse = serde_json::from_str(&body)
            .map_err(|e| ClassifierError::Malformed(e.to_string()))?;
        Ok(parsed.into_ranking(self.top_k))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Classifier used when no model is configured. Always reports unavailable so
/// the keyword heuristic takes over.
pub struct OfflineClassifier;

#[async_trait]
impl EmotionClassifier for OfflineClassifier {
    async fn classify(&self, _text: &str) -> Result<Vec<EmotionScore>, ClassifierError> {
        Err(ClassifierError::Unavailable("no classifier configured".into()))
    }

    fn model_id(&self) -> &str {
        "offline"
    }
}

pub type ClassifierFactory =
    Box<dyn Fn() -> Result<Arc<dyn EmotionClassifier>, ClassifierError> + Send + Sync>;

enum LazyState {
    Pending { failures: u32 },
    Ready(Arc<dyn EmotionClassifier>),
    Unavailable,
}

/// Owns a classifier handle that is built on first use.
pub struct LazyClassifier {
    label: String,
    factory: ClassifierFactory,
    max_init_attempts: u32,
    state: Mutex<LazyState>,
}

impl LazyClassifier {
    pub fn new(label: impl Into<String>, max_init_attempts: u32, factory: ClassifierFactory) -> Self {
        Self {
            label: label.into(),
            factory,
            max_init_attempts: max_init_attempts.max(1),
            state: Mutex::new(LazyState::Pending { failures: 0 }),
        }
    }

    /// Returns the live handle, building it if needed. `None` once construction
    /// has failed `max_init_attempts` times.
    pub async fn handle(&self) -> Option<Arc<dyn EmotionClassifier>> {
        let mut state = self.state.lock().await;
        match &*state {
            LazyState::Ready(inner) => return Some(Arc::clone(inner)),
            LazyState::Unavailable => return None,
            LazyState::Pending { .. } => {}
        }

        match (self.factory)() {
            Ok(inner) => {
                tracing::info!(classifier = %self.label, model = inner.model_id(), "emotion classifier ready");
                *state = LazyState::Ready(Arc::clone(&inner));
                Some(inner)
            }
            Err(error) => {
                let failures = match &*state {
                    LazyState::Pending { failures } => failures + 1,
                    _ => 1,
                };
                if failures >= self.max_init_attempts {
                    tracing::warn!(classifier = %self.label, %error, failures, "emotion classifier marked unavailable");
                    *state = LazyState::Unavailable;
                } else {
                    tracing::warn!(classifier = %self.label, %error, failures, "emotion classifier init failed, will retry");
                    *state = LazyState::Pending { failures };
                }
                None
            }
        }
    }

    pub async fn is_unavailable(&self) -> bool {
        matches!(&*self.state.lock().await, LazyState::Unavailable)
    }
}

#[async_trait]
impl EmotionClassifier for LazyClassifier {
    async fn classify(&self, text: &str) -> Result<Vec<EmotionScore>, ClassifierError> {
        match self.handle().await {
            Some(inner) => inner.classify(text).await,
            None => Err(ClassifierError::Unavailable(self.label.clone())),
        }
    }

    fn model_id(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedClassifier;

    #[async_trait]
    impl EmotionClassifier for FixedClassifier {
        async fn classify(&self, _text: &str) -> Result<Vec<EmotionScore>, ClassifierError> {
            Ok(vec![EmotionScore::new("joy", 0.9)])
        }

        fn model_id(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn nested_response_is_ranked_and_truncated() {
        let parsed: InferenceResponse = serde_json::from_value(serde_json::json!([[
            {"label": "fear", "score": 0.1},
            {"label": "Sadness", "score": 0.7},
            {"label": "anger", "score": 0.15},
            {"label": "joy", "score": 0.05}
        ]]))
        .unwrap();
        let ranking = parsed.into_ranking(3);
        let labels: Vec<_> = ranking.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["sadness", "anger", "fear"]);
    }

    #[test]
    fn flat_response_is_accepted() {
        let parsed: InferenceResponse = serde_json::from_value(serde_json::json!([
            {"label": "joy", "score": 0.8}
        ]))
        .unwrap();
        assert_eq!(parsed.into_ranking(3)[0].label, "joy");
    }

    #[tokio::test]
    async fn huggingface_classify_reads_ranking() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/models/{DEFAULT_EMOTION_MODEL}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([[
                {"label": "joy", "score": 0.91},
                {"label": "surprise", "score": 0.05}
            ]])))
            .mount(&server)
            .await;

        let classifier = HuggingFaceClassifier::new(Some("hf-test".into())).with_base_url(server.uri());
        let ranking = classifier.classify("we won!!").await.unwrap();
        assert_eq!(ranking[0].label, "joy");
        assert!(ranking[0].score > 0.9);
    }

    #[tokio::test]
    async fn huggingface_status_error_is_typed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("loading"))
            .mount(&server)
            .await;

        let classifier = HuggingFaceClassifier::new(None).with_base_url(server.uri());
        let err = classifier.classify("hello there").await.unwrap_err();
        assert!(matches!(err, ClassifierError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn offline_classifier_is_unavailable() {
        let err = OfflineClassifier.classify("hi").await.unwrap_err();
        assert!(matches!(err, ClassifierError::Unavailable(_)));
    }

    #[tokio::test]
    async fn lazy_classifier_builds_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let lazy = LazyClassifier::new(
            "fixed",
            3,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(FixedClassifier) as Arc<dyn EmotionClassifier>)
            }),
        );

        lazy.classify("a").await.unwrap();
        lazy.classify("b").await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lazy_classifier_sticks_unavailable_after_bounded_failures() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let lazy = LazyClassifier::new(
            "broken",
            2,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ClassifierError::Unavailable("model download failed".into()))
            }),
        );

        assert!(lazy.classify("a").await.is_err());
        assert!(!lazy.is_unavailable().await);
        assert!(lazy.classify("b").await.is_err());
        assert!(lazy.is_unavailable().await);
        assert!(lazy.classify("c").await.is_err());
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }
}
