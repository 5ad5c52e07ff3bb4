//! # Sync State
//!
//! Snapshot of the drain loop for status displays.

use super::network_monitor::NetworkStatus;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SyncState {
    /// Whether an effect is on the network right now
    pub is_syncing: bool,
    /// Effect currently in flight
    pub in_flight: Option<Uuid>,
    /// Effects not yet committed or discarded
    pub pending_operations: usize,
    /// Effects discarded since start
    pub discarded_operations: usize,
    /// Last commit timestamp
    pub last_sync: Option<String>,
    pub network_status: NetworkStatus,
    /// Most recent replay error
    pub last_error: Option<String>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            is_syncing: false,
            in_flight: None,
            pending_operations: 0,
            discarded_operations: 0,
            last_sync: None,
            network_status: NetworkStatus::Online,
            last_error: None,
        }
    }
}
