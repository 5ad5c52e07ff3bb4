//! GraphQL-over-HTTP transport
//!
//! Posts `{query, operationName, variables}` JSON to a single endpoint.

use super::Transport;
use crate::shared::config::SyncConfig;
use crate::shared::error::{Result, SyncError};
use crate::shared::graphql::{GraphQLResponse, Operation};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};

/// HTTP transport state
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpTransport {
    /// Create a transport for the configured endpoint
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SyncError::Config {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            token: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, operation: &Operation) -> Result<GraphQLResponse> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&operation.to_request_body());

        if let Some(ref token) = self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::network(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            // Some servers pair GraphQL errors with a non-2xx status
            if let Ok(envelope) = serde_json::from_str::<GraphQLResponse>(&body) {
                if !envelope.errors.is_empty() {
                    return Ok(envelope);
                }
            }
            let message = format!("{} - {}", status, body);
            tracing::debug!("[Transport] {} failed: {}", operation.cache_key(), message);
            return Err(if is_retryable_status(status) {
                SyncError::network(message)
            } else {
                SyncError::permanent_network(message)
            });
        }

        let envelope: GraphQLResponse = serde_json::from_str(&body)?;
        Ok(envelope)
    }
}
