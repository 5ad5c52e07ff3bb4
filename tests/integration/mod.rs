//! Integration tests
//!
//! Each test runs a complete client against a mock GraphQL server.

mod id_reconciliation_test;
mod offline_queue_test;
mod persistence_test;
mod query_fallback_test;
