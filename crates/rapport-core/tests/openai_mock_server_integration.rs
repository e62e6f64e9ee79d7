use std::sync::Arc;

use rapport_core::*;
use rapport_provider::{OpenAiProvider, DEFAULT_EMOTION_MODEL};
use rapport_schema::{OverallState, RuleId, SessionKey};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn mock_openai_response(text: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [{
            "message": {"content": text},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5}
    })
}

fn mock_openai_error(status: u16, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(serde_json::json!({
        "error": {
            "type": "api_error",
            "message": message
        }
    }))
}

fn config_for(server: &MockServer) -> RapportConfig {
    let mut config = RapportConfig::default();
    config.generation.base_backoff_ms = 1;
    config.knowledge.enabled = false;
    config.knowledge.base_url = server.uri();
    config
}

fn orchestrator(config: &RapportConfig, server: &MockServer) -> Orchestrator {
    let provider = Arc::new(OpenAiProvider::new("test-key", server.uri()));
    Orchestrator::new(
        config,
        Arc::new(Lexicon::builtin()),
        Collaborators::with_provider(config, provider),
    )
}

#[tokio::test]
async fn greeting_round_trip_with_header_verification() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(serde_json::json!({
            "model": "llama-3.1-8b-instant",
            "max_tokens": 220
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(mock_openai_response(
            "Hey there! Good to see you. How has your day been going? Anything on your mind?",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let reply = orchestrator(&config, &server)
        .handle_message(&SessionKey::new("web-1"), "hi")
        .await;

    assert_eq!(
        reply.reply,
        "Hey there! Good to see you. How has your day been going?"
    );
    assert_eq!(reply.policy.unwrap().rule_id, RuleId::DefaultNeutral);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = requests[0].body_json().unwrap();
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][0]["content"], GenerationProfile::DEFAULT.system);
    let prompt = body["messages"][1]["content"].as_str().unwrap();
    assert!(prompt.ends_with("User message:\nhi"));
}

#[tokio::test]
async fn overloaded_upstream_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(mock_openai_error(503, "overloaded"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(mock_openai_response("Back again. Glad you wrote.")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let reply = orchestrator(&config, &server)
        .handle_message(&SessionKey::new("web-1"), "hello again")
        .await;
    assert_eq!(reply.reply, "Back again. Glad you wrote.");
}

#[tokio::test]
async fn auth_failure_is_not_retried_and_falls_back() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(mock_openai_error(401, "bad key"))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let reply = orchestrator(&config, &server)
        .handle_message(&SessionKey::new("web-1"), "hello again")
        .await;
    assert_eq!(reply.reply, FALLBACK_REPLY);
}

#[tokio::test]
async fn classifier_and_knowledge_feed_the_prompt() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/models/{DEFAULT_EMOTION_MODEL}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([[
            {"label": "joy", "score": 0.92},
            {"label": "surprise", "score": 0.05}
        ]])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page/summary/inception"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "extract": "Inception is a 2010 science fiction action film."
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({"max_tokens": 260})))
        .respond_with(ResponseTemplate::new(200).set_body_json(mock_openai_response(
            "Such a great pick. The layered dream idea still holds up",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.knowledge.enabled = true;
    config.classifier.enabled = true;
    config.classifier.endpoint = Some(server.uri());

    let reply = orchestrator(&config, &server)
        .handle_message(&SessionKey::new("web-2"), "inception movie")
        .await;

    assert_eq!(reply.overall_state, OverallState::SuperHappy);
    assert_eq!(reply.signal.labels(), vec!["joy", "surprise"]);
    assert_eq!(reply.policy.unwrap().rule_id, RuleId::Hype);
    assert_eq!(
        reply.reply,
        "Such a great pick. The layered dream idea still holds up."
    );

    let requests = server.received_requests().await.unwrap();
    let chat = requests
        .iter()
        .find(|r| r.url.path() == "/chat/completions")
        .unwrap();
    let body: serde_json::Value = chat.body_json().unwrap();
    let prompt = body["messages"][1]["content"].as_str().unwrap();
    assert!(prompt.contains("Inception is a 2010 science fiction action film."));
    assert!(prompt.contains("Detected emotions: joy, surprise | overall: super_happy"));
}
