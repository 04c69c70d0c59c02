//! Shared helpers for integration tests against a WireMock server.

#![allow(dead_code)]

use integrations_canvas::{CanvasClient, CanvasClientBuilder, RetryConfig};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

pub const TOKEN: &str = "test-token";

/// Starts a fresh mock server.
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Full request path for an API-relative path.
pub fn api_path(relative: &str) -> String {
    format!("/api/v1/{}", relative.trim_start_matches('/'))
}

/// Retry settings that keep tests fast.
pub fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
    }
}

/// Builder pointed at the mock server with pacing that never gets in the way.
pub fn client_builder(server: &MockServer) -> CanvasClientBuilder {
    CanvasClient::builder()
        .base_url(format!("{}/api/v1", server.uri()))
        .access_token(TOKEN)
        .requests_per_second(1000.0)
        .retry(fast_retry(3))
}

/// Client pointed at the mock server.
pub fn test_client(server: &MockServer) -> CanvasClient {
    client_builder(server).build().expect("Failed to build client")
}

/// Authenticated GET matcher for an API-relative path.
pub fn mock_get(relative: &str) -> MockBuilder {
    Mock::given(method("GET"))
        .and(path(api_path(relative)))
        .and(header("Authorization", format!("Bearer {}", TOKEN).as_str()))
}

/// Helper to create success response templates.
pub fn success_response(body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

/// Helper to create error response templates in Canvas's format.
pub fn error_response(status: u16, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(serde_json::json!({
        "errors": [{ "message": message }]
    }))
}
