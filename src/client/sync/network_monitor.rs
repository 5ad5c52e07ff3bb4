//! # Network Monitor
//!
//! Reachability as reported by the host application. The monitor does no
//! probing of its own: the application calls [`NetworkMonitor::set_status`]
//! and the drain loop suspends in [`NetworkMonitor::wait_online`] while the
//! backend is unreachable.

use crate::shared::event::{broadcast_event, QueueEvent, QueueEventBroadcast, QueueEventKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NetworkStatus {
    Online,
    Limited,
    Offline,
}

impl NetworkStatus {
    /// Whether requests can be attempted
    pub fn is_reachable(self) -> bool {
        !matches!(self, NetworkStatus::Offline)
    }
}

#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    status_tx: Arc<watch::Sender<NetworkStatus>>,
    events: Option<QueueEventBroadcast>,
}

impl NetworkMonitor {
    pub fn new(initial: NetworkStatus) -> Self {
        let (status_tx, _) = watch::channel(initial);
        Self {
            status_tx: Arc::new(status_tx),
            events: None,
        }
    }

    /// Announce reachability changes on the queue event channel
    pub fn with_events(mut self, events: QueueEventBroadcast) -> Self {
        self.events = Some(events);
        self
    }

    pub fn get_status(&self) -> NetworkStatus {
        *self.status_tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.get_status().is_reachable()
    }

    /// Update the status; returns whether reachability changed
    pub fn set_status(&self, status: NetworkStatus) -> bool {
        let previous = self.status_tx.send_replace(status);
        let changed = previous.is_reachable() != status.is_reachable();
        if changed {
            tracing::info!("[Sync] Network {:?} -> {:?}", previous, status);
            if let Some(events) = &self.events {
                broadcast_event(
                    events,
                    QueueEvent::new(QueueEventKind::ConnectivityChanged {
                        online: status.is_reachable(),
                    }),
                );
            }
        }
        changed
    }

    /// Receive every status update
    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.status_tx.subscribe()
    }

    /// Resolve once the backend is reachable
    pub async fn wait_online(&self) {
        let mut rx = self.status_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|status| status.is_reachable()).await;
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkStatus::Online)
    }
}
