//! # Offline Mutation Support
//!
//! Everything that lets a mutation be issued without a server round-trip:
//!
//! - **Intercept**: route first issuances to the queue, replays to the network
//! - **Queue**: ordered, durable effects with snapshot-based rollback
//! - **Identifier map**: temporary → server identifiers and payload rewriting
//! - **Fallback**: cache-only query reads while offline
//! - **Retry**: backoff between transient failures

pub mod effect;
pub mod fallback;
pub mod id_map;
pub mod intercept;
pub mod queue;
pub mod retry;
pub mod snapshot;

pub use effect::{EffectStatus, MutationEffect};
pub use fallback::QueryFallbackReader;
pub use id_map::{extract_identifiers, map_identifiers, resolve_references, IdMap, TempIdEntry};
pub use intercept::{Dispatched, MutationContext, MutationIntercept};
pub use queue::{CommitOutcome, Continuations, MutationQueue, UpdateFn};
pub use retry::BackoffStrategy;
pub use snapshot::CacheSnapshot;
