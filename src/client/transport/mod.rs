//! # GraphQL Transport Boundary
//!
//! The network side of the sync layer. A transport executes one operation and
//! yields exactly one response (single-value stream semantics). Transport
//! failures come back as [`SyncError::Network`](crate::shared::SyncError);
//! GraphQL errors come back inside the response envelope and are classified by
//! the caller.
//!
//! Dropping the returned future cancels the request.

pub mod http;

pub use http::HttpTransport;

use crate::shared::error::Result;
use crate::shared::graphql::{GraphQLResponse, Operation};
use async_trait::async_trait;

/// Executes GraphQL operations against a backend
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute `operation` and return the response envelope
    async fn execute(&self, operation: &Operation) -> Result<GraphQLResponse>;
}
