//! Queue Event System
//!
//! Events describing queue-state changes. They are the only externally
//! observable effect of issuing a mutation while offline, and are fanned out to
//! any number of listeners over a `tokio::sync::broadcast` channel.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Kind of queue event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEventKind {
    /// Cache snapshot taken before the first effect of a batch was enqueued
    SnapshotSaved,
    /// Mutation effect appended to the queue
    Enqueued { mutation_name: Option<String> },
    /// Effect handed to the network
    ReplayStarted { attempt: u32 },
    /// Effect confirmed by the server
    Committed,
    /// Effect dropped permanently
    Discarded { reason: String },
    /// Effect stays at the head and will be retried
    RetryScheduled { retry_count: u32, delay_ms: u64 },
    /// Effect will be retried with variables returned by the conflict resolver
    VariablesReplaced,
    /// Queue became empty
    Drained,
    /// Reachability changed
    ConnectivityChanged { online: bool },
    /// Persisted queue state loaded
    Hydrated { pending: usize },
}

/// Queue event broadcast to listeners
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueEvent {
    /// Effect the event concerns, if any
    pub effect_id: Option<Uuid>,
    /// What happened
    #[serde(flatten)]
    pub kind: QueueEventKind,
    /// Timestamp when the event occurred
    pub timestamp: String,
}

impl QueueEvent {
    /// Create an event about the queue as a whole
    pub fn new(kind: QueueEventKind) -> Self {
        Self {
            effect_id: None,
            kind,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Create an event about a specific effect
    pub fn for_effect(effect_id: Uuid, kind: QueueEventKind) -> Self {
        Self {
            effect_id: Some(effect_id),
            ..Self::new(kind)
        }
    }
}

/// Broadcast channel sender for queue events
pub type QueueEventBroadcast = broadcast::Sender<QueueEvent>;

/// Broadcast a queue event to all subscribers
///
/// Returns the number of subscribers that received the event (0 if none).
pub fn broadcast_event(broadcast_tx: &QueueEventBroadcast, event: QueueEvent) -> usize {
    match broadcast_tx.send(event) {
        Ok(subscriber_count) => subscriber_count,
        Err(e) => {
            // No subscribers, that's okay
            tracing::trace!("[Events] No subscribers to receive event: {:?}", e.0.kind);
            0
        }
    }
}
