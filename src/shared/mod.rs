//! Shared Module
//!
//! Types shared by every part of the sync layer: GraphQL wire types, the
//! document scanner, the error taxonomy, configuration, and queue events.
//! None of these types perform I/O.

/// GraphQL operations and response envelopes
pub mod graphql;

/// Minimal GraphQL document reader
pub mod document;

/// Shared error types
pub mod error;

/// Sync configuration
pub mod config;

/// Queue events
pub mod event;

/// Re-export commonly used types for convenience
pub use config::{ConfigError, SyncConfig, SyncConfigBuilder};
pub use error::SyncError;
pub use event::{QueueEvent, QueueEventKind};
pub use graphql::{GraphQLError, GraphQLResponse, Operation, OperationType};
