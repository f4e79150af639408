//! Common test utilities for beacon-api integration tests

#![allow(dead_code)]

use beacon_api::{ApiClient, ApiConfig};
use serde_json::{json, Value};
use wiremock::{MockServer, ResponseTemplate};

pub const TOKEN: &str = "test-token";
pub const APP_ID: &str = "test-app";

/// Client pointed at the mock server with a token and app id
pub fn api(server: &MockServer) -> ApiClient {
    ApiClient::new(ApiConfig::new(server.uri()).app_id(APP_ID).token(TOKEN)).unwrap()
}

/// 200 response wrapping `data` in a JSend success envelope
pub fn success(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"status": "success", "data": data}))
}

/// Value of a header on the only request the server received
pub async fn single_request_header(server: &MockServer, name: &str) -> Option<String> {
    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1, "expected exactly one request");
    requests[0]
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
