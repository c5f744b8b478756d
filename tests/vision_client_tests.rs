//! HTTP vision client against a mock generateContent endpoint.

use bytes::Bytes;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use invoice_pipeline::config::LlmConfig;
use invoice_pipeline::llm::{ExtractionRequest, HttpVisionClient, VisionModel};
use invoice_pipeline::PipelineError;

fn config(endpoint: String) -> LlmConfig {
    LlmConfig {
        model: "test-model".to_string(),
        endpoint,
        api_key: Some("test-key".to_string()),
        temperature: 0.1,
        max_output_tokens: 4096,
    }
}

fn request() -> ExtractionRequest {
    ExtractionRequest {
        prompt: "Extract the invoice".to_string(),
        image_png: Bytes::from_static(b"png-bytes"),
        response_schema: json!({"type": "object"}),
    }
}

#[tokio::test]
async fn successful_call_returns_candidate_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/test-model:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "generationConfig": {
                "temperature": 0.1,
                "maxOutputTokens": 4096,
                "responseMimeType": "application/json",
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "{\"invoice_id\":" },
                        { "text": "\"UE-1\"}" }
                    ]
                }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpVisionClient::new(config(server.uri())).unwrap();
    let response = client.extract(&request()).await.unwrap();

    assert_eq!(response.text, "{\"invoice_id\":\"UE-1\"}");
    assert_eq!(response.model, "test-model");
}

#[tokio::test]
async fn rate_limit_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = HttpVisionClient::new(config(server.uri())).unwrap();
    let err = client.extract(&request()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Throttled(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn server_error_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = HttpVisionClient::new(config(server.uri())).unwrap();
    let err = client.extract(&request()).await.unwrap_err();

    assert!(matches!(err, PipelineError::ModelTransport(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn client_error_is_permanent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "invalid schema"})),
        )
        .mount(&server)
        .await;

    let client = HttpVisionClient::new(config(server.uri())).unwrap();
    let err = client.extract(&request()).await.unwrap_err();

    assert!(matches!(err, PipelineError::ModelResponse(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn empty_candidates_are_permanent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let client = HttpVisionClient::new(config(server.uri())).unwrap();
    let err = client.extract(&request()).await.unwrap_err();

    assert!(matches!(err, PipelineError::ModelResponse(_)));
    assert!(!err.is_transient());
}
