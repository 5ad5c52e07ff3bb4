// Increase recursion limit for deeply nested json! literals in tests
#![recursion_limit = "256"]

//! xfsync - Offline GraphQL Mutation Sync
//!
//! xfsync sits between a GraphQL client and its normalized cache and lets an
//! application keep issuing mutations while disconnected. Mutations are applied
//! optimistically, queued durably in SQLite, and replayed in order once the
//! backend is reachable again.
//!
//! # Overview
//!
//! - Offline mutation queue with exactly one effect in flight
//! - Optimistic results with snapshot-based rollback
//! - Temporary → server identifier reconciliation across dependent mutations
//! - Conflict handling for conditional-write backends through a user resolver
//! - Cache-only query fallback while offline
//!
//! # Module Structure
//!
//! - **`shared`** - Types with no I/O
//!   - GraphQL operations and response envelopes, document scanner
//!   - Error types, configuration, queue events
//!
//! - **`client`** - The sync layer
//!   - Cache and transport boundaries
//!   - Offline queue, identifier map, snapshots, intercept
//!   - Replay executor, discard policy, background drain loop
//!   - SQLite persistence
//!
//! # Usage
//!
//! ```rust,no_run
//! use xfsync::client::OfflineClient;
//! use xfsync::shared::SyncConfig;
//!
//! # async fn example() -> xfsync::shared::error::Result<()> {
//! let config = SyncConfig::default().with_env_overrides()?;
//! let client = OfflineClient::builder(config).build().await?;
//!
//! client.set_online(false);
//! // mutations issued now are queued and answered optimistically
//! # Ok(())
//! # }
//! ```
//!
//! # Delivery
//!
//! Delivery is at-least-once. An effect interrupted mid-flight (process exit,
//! aborted drain loop) is sent again; idempotency is left to the backend's
//! conditional writes.
//!
//! # Thread Safety
//!
//! The queue, identifier map and snapshot share one `tokio::sync::Mutex`.
//! Status and metrics sit behind `Arc<RwLock<>>`; events fan out over a
//! `broadcast::Sender`.
//!
//! # Error Handling
//!
//! Every failure is a [`shared::error::SyncError`]. The same value reaches the
//! discard policy and the caller whose mutation was discarded.

/// Shared types and data structures
pub mod shared;

/// Offline sync client
pub mod client;
