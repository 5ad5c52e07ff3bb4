//! Shared Error Types
//!
//! This module defines the error taxonomy of the sync layer. Every failure a
//! queued mutation can run into is expressed as a [`SyncError`] so the discard
//! policy can classify it and the original caller can be handed the same value.
//!
//! # Error Categories
//!
//! - `Network` - transport-level failure; retried unless marked permanent
//! - `GraphQL` - backend-reported errors (business errors and write conflicts)
//! - `Validation` - rejected by this crate before reaching the network
//! - `Patch` - a queued payload could not be rewritten or applied to the cache
//! - `Storage` / `Serialization` - local persistence failures
//!
//! # Usage
//!
//! ```rust
//! use xfsync::shared::error::SyncError;
//!
//! let error = SyncError::validation("variables", "Variables must be an object");
//! assert!(error.is_client_validation());
//! ```
//!
//! All variants are `Clone` so a single failure can reach both the discard
//! policy and the caller's completion channel.
use crate::shared::config::ConfigError;
use crate::shared::graphql::GraphQLError;
use serde_json::Value;
use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors produced by the offline sync layer
#[derive(Debug, Error, Clone)]
pub enum SyncError {
    /// Transport failure (connection refused, timeout, 5xx)
    #[error("Network error: {message}")]
    Network {
        /// Human-readable error message
        message: String,
        /// Set when retrying cannot succeed (e.g. 4xx responses)
        permanent: bool,
    },

    /// Errors reported by the GraphQL backend
    #[error("GraphQL error: {}", format_graphql_errors(.errors))]
    GraphQL {
        /// Errors from the response envelope
        errors: Vec<GraphQLError>,
    },

    /// Client-side validation failure
    #[error("Validation error in field '{field}': {message}")]
    Validation {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },

    /// Failure rewriting or applying a payload
    #[error("Patch error: {message}")]
    Patch {
        /// Human-readable error message
        message: String,
    },

    /// Query result not present in the local cache
    #[error("Cache miss: {key}")]
    CacheMiss {
        /// Cache key that was looked up
        key: String,
    },

    /// Local storage failure
    #[error("Storage error: {message}")]
    Storage {
        /// Human-readable error message
        message: String,
    },

    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Human-readable error message
        message: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable error message
        message: String,
    },
}

fn format_graphql_errors(errors: &[GraphQLError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl SyncError {
    /// Create a transient network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            permanent: false,
        }
    }

    /// Create a network error that must not be retried
    pub fn permanent_network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            permanent: true,
        }
    }

    /// Create a backend error from response errors
    pub fn graphql(errors: Vec<GraphQLError>) -> Self {
        Self::GraphQL { errors }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new patch error
    pub fn patch(message: impl Into<String>) -> Self {
        Self::Patch {
            message: message.into(),
        }
    }

    /// Create a new storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// The first error reporting a rejected conditional write, if any
    pub fn conflict(&self) -> Option<&GraphQLError> {
        match self {
            Self::GraphQL { errors } => errors.iter().find(|e| e.is_conditional_check_failed()),
            _ => None,
        }
    }

    /// Conflicting server data carried by a conditional-check failure
    pub fn conflict_data(&self) -> Option<&Value> {
        self.conflict().and_then(|e| e.data.as_ref())
    }

    /// Whether the backend reported any GraphQL error
    pub fn has_graphql_errors(&self) -> bool {
        matches!(self, Self::GraphQL { errors } if !errors.is_empty())
    }

    /// Whether the error originates from this crate's own validation
    pub fn is_client_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Whether retrying can never succeed
    ///
    /// Only network errors can be transient; everything else is permanent.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Network { permanent, .. } => *permanent,
            _ => true,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            // Timeouts and throttling are worth another attempt
            Some(status) if status.as_u16() == 408 || status.as_u16() == 429 => Self::network(err.to_string()),
            Some(status) if status.is_client_error() => Self::permanent_network(err.to_string()),
            _ if err.is_builder() => Self::permanent_network(err.to_string()),
            _ => Self::network(err.to_string()),
        }
    }
}

impl From<ConfigError> for SyncError {
    fn from(err: ConfigError) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}
