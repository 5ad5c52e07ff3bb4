//! Common test utilities and helpers
//!
//! - Mock GraphQL server helpers
//! - Client and database fixtures
//! - Custom assertion macros

pub mod client;
pub mod mock_server;

pub use client::*;
pub use mock_server::*;
