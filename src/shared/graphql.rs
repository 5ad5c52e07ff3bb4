//! GraphQL Wire Types
//!
//! Operation and response types exchanged with the transport. These mirror the
//! standard GraphQL-over-HTTP JSON envelope so queued effects can be persisted
//! and replayed without re-parsing anything but the document header.
//!
//! # Backend conflicts
//!
//! Conditional-write backends report a rejected write as a GraphQL error whose
//! `errorType` is [`CONDITIONAL_CHECK_FAILED`]. The error's `data` field carries
//! the item currently stored on the server.

use crate::shared::document;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Error type reported by the backend when a conditional write was rejected
pub const CONDITIONAL_CHECK_FAILED: &str = "DynamoDB:ConditionalCheckFailedException";

/// Kind of GraphQL operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationType::Query => "query",
            OperationType::Mutation => "mutation",
            OperationType::Subscription => "subscription",
        };
        f.write_str(name)
    }
}

/// A GraphQL operation: document plus variables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    /// GraphQL document text
    pub document: String,
    /// Operation name declared in the document, if any
    pub operation_name: Option<String>,
    /// Operation kind declared in the document
    pub operation_type: OperationType,
    /// Variables sent alongside the document
    #[serde(default)]
    pub variables: Map<String, Value>,
}

impl Operation {
    /// Build an operation from a document, reading its type and name from the header
    pub fn new(document: impl Into<String>) -> Self {
        let document = document.into();
        let header = document::parse_header(&document);
        Self {
            document,
            operation_name: header.name,
            operation_type: header.operation_type,
            variables: Map::new(),
        }
    }

    /// Attach variables
    ///
    /// Non-object values are ignored; GraphQL variables are always a map.
    pub fn with_variables(mut self, variables: Value) -> Self {
        if let Value::Object(map) = variables {
            self.variables = map;
        }
        self
    }

    /// Response keys of the top-level selection set
    pub fn root_fields(&self) -> Vec<String> {
        document::top_level_fields(&self.document)
    }

    /// Whether this operation is a mutation
    pub fn is_mutation(&self) -> bool {
        self.operation_type == OperationType::Mutation
    }

    /// Stable key for the operation and its variables, used by caches
    pub fn cache_key(&self) -> String {
        let name = self
            .operation_name
            .clone()
            .unwrap_or_else(|| self.root_fields().join(","));
        format!("{}:{}({})", self.operation_type, name, Value::Object(self.variables.clone()))
    }

    /// JSON body posted to a GraphQL endpoint
    pub fn to_request_body(&self) -> Value {
        serde_json::json!({
            "query": self.document,
            "operationName": self.operation_name,
            "variables": self.variables,
        })
    }
}

/// Location of an error in the document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorLocation {
    pub line: u32,
    pub column: u32,
}

/// A single error entry of a GraphQL response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLError {
    pub message: String,
    /// Backend error classification (AppSync style)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Backend-supplied payload (the conflicting item for conditional-check failures)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<ErrorLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQLError {
    /// Create an error with just a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: None,
            data: None,
            path: Vec::new(),
            locations: Vec::new(),
            extensions: None,
        }
    }

    /// Set the backend error type
    pub fn with_error_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    /// Set the backend payload
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Set the response path
    pub fn with_path(mut self, path: Vec<Value>) -> Self {
        self.path = path;
        self
    }

    /// Whether this error reports a rejected conditional write
    pub fn is_conditional_check_failed(&self) -> bool {
        self.error_type.as_deref() == Some(CONDITIONAL_CHECK_FAILED)
    }
}

impl fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_type {
            Some(kind) => write!(f, "{} ({})", self.message, kind),
            None => f.write_str(&self.message),
        }
    }
}

/// Response envelope returned by the transport
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphQLResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
}

impl GraphQLResponse {
    /// Successful response carrying `data`
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// Failed response carrying GraphQL errors
    pub fn errors(errors: Vec<GraphQLError>) -> Self {
        Self { data: None, errors }
    }
}
