//! # Mutation Effects
//!
//! A [`MutationEffect`] is one queued mutation: the operation to send, the
//! optimistic response shown while it waits, and its replay bookkeeping. The
//! effect id doubles as the correlation token tying temporary identifiers to
//! the mutation that introduced them.

use crate::shared::graphql::Operation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle state of an effect
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EffectStatus {
    /// Waiting in the queue
    Queued,
    /// Handed to the network
    InFlight,
    /// Confirmed by the server
    Committed,
    /// Dropped permanently
    Discarded,
}

impl EffectStatus {
    /// Whether the effect has left the queue for good
    pub fn is_terminal(self) -> bool {
        matches!(self, EffectStatus::Committed | EffectStatus::Discarded)
    }
}

/// Queued mutation with metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MutationEffect {
    /// Effect ID and correlation token
    pub id: Uuid,
    /// Mutation to send
    pub operation: Operation,
    /// Result shown to the caller and written to the cache while queued
    pub optimistic_response: Option<Value>,
    /// Queries re-run after the mutation commits
    #[serde(default)]
    pub refetch_queries: Vec<Operation>,
    /// Current status
    pub status: EffectStatus,
    /// Failed attempts so far
    pub retry_count: u32,
    /// Timestamp when queued
    pub enqueued_at: String,
    /// Timestamp of last attempt
    pub last_attempt: Option<String>,
    /// Error message from last failure
    pub last_error: Option<String>,
}

impl MutationEffect {
    /// Create a queued effect for `operation`
    pub fn new(operation: Operation) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            optimistic_response: None,
            refetch_queries: Vec::new(),
            status: EffectStatus::Queued,
            retry_count: 0,
            enqueued_at: chrono::Utc::now().to_rfc3339(),
            last_attempt: None,
            last_error: None,
        }
    }

    /// Set the optimistic response
    pub fn with_optimistic_response(mut self, response: Value) -> Self {
        self.optimistic_response = Some(response);
        self
    }

    /// Set the queries re-run after commit
    pub fn with_refetch_queries(mut self, queries: Vec<Operation>) -> Self {
        self.refetch_queries = queries;
        self
    }

    /// Name used in logs and conflict reports
    pub fn mutation_name(&self) -> Option<String> {
        self.operation
            .operation_name
            .clone()
            .or_else(|| self.operation.root_fields().into_iter().next())
    }

    /// Result handed to the caller before the server answers
    ///
    /// The optimistic response when one was given, otherwise every top-level
    /// response key mapped to `null`.
    pub fn immediate_result(&self) -> Value {
        match &self.optimistic_response {
            Some(response) => response.clone(),
            None => null_skeleton(&self.operation),
        }
    }
}

/// Every top-level response key of `operation` mapped to `null`
pub fn null_skeleton(operation: &Operation) -> Value {
    Value::Object(
        operation
            .root_fields()
            .into_iter()
            .map(|field| (field, Value::Null))
            .collect(),
    )
}
