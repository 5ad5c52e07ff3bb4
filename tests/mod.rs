//! Test suite for xfsync
//!
//! Integration tests drive a full `OfflineClient` against a wiremock GraphQL
//! server; property tests exercise identifier extraction and rewriting.

pub mod common;
pub mod integration;
pub mod property;
