//! Integration tests for the analysis relay server
//!
//! The relay is started on an ephemeral port with a wiremock server standing
//! in for the completion endpoint, and exercised over real HTTP.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use ferusher_engine::llm::OpenAICompatibleTransport;
use ferusher_engine::server::RelayServer;

async fn start_relay() -> RelayServer {
    let upstream = OpenAICompatibleTransport::new(Duration::from_secs(5)).unwrap();
    RelayServer::start("127.0.0.1:0", Arc::new(upstream))
        .await
        .unwrap()
}

fn analyze_url(server: &RelayServer) -> String {
    format!("http://{}/api/analyze", server.local_addr())
}

#[tokio::test]
async fn test_missing_api_key_is_unauthorized() {
    let relay = start_relay().await;
    let client = reqwest::Client::new();

    for body in [json!({"prompt": "p"}), json!({"prompt": "p", "apiKey": ""})] {
        let response = client
            .post(analyze_url(&relay))
            .json(&body)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 401);
        assert_eq!(response.text().await.unwrap(), "API Key is required");
    }

    relay.shutdown().await;
}

#[tokio::test]
async fn test_streams_upstream_text() {
    let mock_server = MockServer::start().await;
    let sse = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Event \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"loop\"}}]}\n\n",
        "data: [DONE]\n\n"
    );

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-relay"))
        .and(body_partial_json(json!({"model": "relay-model", "stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let relay = start_relay().await;
    let response = reqwest::Client::new()
        .post(analyze_url(&relay))
        .json(&json!({
            "prompt": "Explain the event loop",
            "apiKey": "sk-relay",
            "baseUrl": mock_server.uri(),
            "model": "relay-model"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"));
    assert_eq!(response.text().await.unwrap(), "Event loop");

    relay.shutdown().await;
}

#[tokio::test]
async fn test_upstream_failure_is_generic_500() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key sk-relay"))
        .mount(&mock_server)
        .await;

    let relay = start_relay().await;
    let response = reqwest::Client::new()
        .post(analyze_url(&relay))
        .json(&json!({
            "prompt": "p",
            "apiKey": "sk-relay",
            "baseUrl": mock_server.uri()
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "Failed to generate analysis"}));

    relay.shutdown().await;
}
