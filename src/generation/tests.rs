use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server_uri: &str) -> GenerationConfig {
    GenerationConfig {
        base_url: server_uri.to_string(),
        model: "test-model".to_string(),
        api_key: Some("test-key".to_string()),
        ..GenerationConfig::default()
    }
}

fn prompt(text: &str) -> Vec<PromptContent> {
    vec![PromptContent::new("user", text.to_string())]
}

#[test]
fn prompt_content_wire_shape() {
    let content = PromptContent::new("user", "hello".to_string());
    let serialized = serde_json::to_value(&content).expect("content should serialize");
    assert_eq!(
        serialized,
        json!({ "role": "user", "parts": [{ "text": "hello" }] })
    );
}

#[test]
fn missing_api_key_fails_at_construction() {
    let config = GenerationConfig {
        api_key: None,
        api_key_env: "DOCQA_GENERATION_TEST_KEY_UNSET".to_string(),
        ..GenerationConfig::default()
    };
    let err = GeminiClient::new(&config).expect_err("missing key should be rejected");
    assert!(matches!(err, DocQaError::Config(_)));
}

#[tokio::test]
async fn returns_first_candidate_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/test-model:generateContent"))
        .and(query_param("key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [{ "role": "user", "parts": [{ "text": "what is alpha?" }] }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{ "text": "alpha is the first letter" }]
                }
            }]
        })))
        .mount(&server)
        .await;

    let client = GeminiClient::new(&config_for(&server.uri())).expect("client should build");
    let contents = prompt("what is alpha?");
    let answer = tokio::task::spawn_blocking(move || client.generate(&contents))
        .await
        .expect("task should join")
        .expect("generate should succeed");

    assert_eq!(answer, "alpha is the first letter");
}

#[tokio::test]
async fn server_error_surfaces_as_generation_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "code": 500, "message": "internal error" }
        })))
        .mount(&server)
        .await;

    let client = GeminiClient::new(&config_for(&server.uri())).expect("client should build");
    let contents = prompt("anything");
    let err = tokio::task::spawn_blocking(move || client.generate(&contents))
        .await
        .expect("task should join")
        .expect_err("server error should fail the call");

    assert!(matches!(err, DocQaError::Generation(_)));
    assert!(err.to_string().contains("500"), "unexpected error: {err}");
}

#[tokio::test]
async fn response_without_candidates_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = GeminiClient::new(&config_for(&server.uri())).expect("client should build");
    let contents = prompt("anything");
    let err = tokio::task::spawn_blocking(move || client.generate(&contents))
        .await
        .expect("task should join")
        .expect_err("empty response should fail the call");

    assert!(matches!(err, DocQaError::Generation(_)));
}

#[tokio::test]
async fn blank_candidate_text_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "   " }] } }]
        })))
        .mount(&server)
        .await;

    let client = GeminiClient::new(&config_for(&server.uri())).expect("client should build");
    let contents = prompt("anything");
    let err = tokio::task::spawn_blocking(move || client.generate(&contents))
        .await
        .expect("task should join")
        .expect_err("blank answer should fail the call");

    assert!(matches!(err, DocQaError::Generation(_)));
}

#[tokio::test]
async fn malformed_response_body_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy error</html>"))
        .mount(&server)
        .await;

    let client = GeminiClient::new(&config_for(&server.uri())).expect("client should build");
    let contents = prompt("anything");
    let err = tokio::task::spawn_blocking(move || client.generate(&contents))
        .await
        .expect("task should join")
        .expect_err("malformed body should fail the call");

    assert!(matches!(err, DocQaError::Generation(_)));
}
