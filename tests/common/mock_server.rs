//! Mock GraphQL server helpers
//!
//! Responses are matched on the `operationName` of the posted body, so each
//! test mounts one mock per mutation it issues.

use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const GRAPHQL_PATH: &str = "/graphql";

/// Start a mock server with nothing mounted
pub async fn start_graphql_server() -> MockServer {
    MockServer::start().await
}

/// Endpoint URL of the mock server
pub fn graphql_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), GRAPHQL_PATH)
}

/// `200 {"data": ...}`
pub fn data_response(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "data": data }))
}

/// `200 {"data": null, "errors": [...]}`
pub fn errors_response(errors: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "data": null, "errors": errors }))
}

/// Plain-text server failure
pub fn server_error() -> ResponseTemplate {
    ResponseTemplate::new(500).set_body_string("internal error")
}

/// Answer every request for `operation_name` with `response`
pub async fn mount_operation(server: &MockServer, operation_name: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_partial_json(json!({ "operationName": operation_name })))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Like [`mount_operation`] with the response held back for `delay`
pub async fn mount_delayed_operation(server: &MockServer, operation_name: &str, data: Value, delay: Duration) {
    mount_operation(server, operation_name, data_response(data).set_delay(delay)).await;
}

/// Request bodies the server has received, in arrival order
pub async fn received_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| serde_json::from_slice(&request.body).expect("request body is JSON"))
        .collect()
}

/// `operationName` of every received request, in arrival order
pub async fn received_operation_names(server: &MockServer) -> Vec<String> {
    received_bodies(server)
        .await
        .iter()
        .filter_map(|body| body["operationName"].as_str().map(str::to_string))
        .collect()
}

/// Answer the next request for `operation_name` with `response`, ahead of any
/// other mock for that operation
pub async fn mount_operation_once(server: &MockServer, operation_name: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_partial_json(json!({ "operationName": operation_name })))
        .respond_with(response)
        .up_to_n_times(1)
        .with_priority(1)
        .mount(server)
        .await;
}
