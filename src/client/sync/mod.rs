//! # Background Sync Service
//!
//! Drains the mutation queue in the background: one effect at a time, in
//! enqueue order, only while the backend is reachable.
//!
//! ## Architecture
//!
//! - **Replay Executor**: one network attempt for the head effect
//! - **Discard Policy**: retry, retry with new variables, or discard
//! - **Network Monitor**: suspends the loop while offline
//! - **Backoff**: delay between transient failures
//! - **Sync State / Metrics**: status for displays
//!
//! ## Suspension points
//!
//! The loop waits on the hydration gate, on new work, on reachability, on the
//! in-flight response and on the retry delay. Stopping the service aborts the
//! task; an interrupted effect stays queued and is sent again later.

pub mod conflict_resolver;
pub mod executor;
pub mod metrics;
pub mod network_monitor;
pub mod sync_state;

pub use conflict_resolver::{ConflictResolution, ConflictResolutionInfo, ConflictResolver, Decision, DiscardPolicy};
pub use executor::{HydrationGate, ReplayExecutor, ReplayOutcome};
pub use metrics::ReplayMetrics;
pub use network_monitor::{NetworkMonitor, NetworkStatus};
pub use sync_state::SyncState;

use crate::client::offline::effect::MutationEffect;
use crate::client::offline::queue::MutationQueue;
use crate::client::offline::retry::BackoffStrategy;
use crate::shared::error::{Result, SyncError};
use crate::shared::event::{broadcast_event, QueueEvent, QueueEventBroadcast, QueueEventKind};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Handles shared by the service and its background task
#[derive(Clone)]
struct DrainWorker {
    executor: Arc<ReplayExecutor>,
    policy: DiscardPolicy,
    queue: Arc<MutationQueue>,
    monitor: NetworkMonitor,
    backoff: BackoffStrategy,
    events: QueueEventBroadcast,
    sync_state: Arc<RwLock<SyncState>>,
    metrics: Arc<RwLock<ReplayMetrics>>,
}

impl DrainWorker {
    async fn run(self) {
        self.executor.gate().wait().await;
        tracing::info!("[Sync] Drain loop started");

        loop {
            if self.queue.pending_count().await == 0 {
                self.refresh_state().await;
                self.queue.wait_for_work().await;
                continue;
            }

            if !self.monitor.is_online() {
                tracing::debug!("[Sync] Offline, waiting for connectivity");
                self.refresh_state().await;
                self.monitor.wait_online().await;
                continue;
            }

            if let Err(e) = self.drain_once().await {
                tracing::error!("[Sync] Drain step failed: {}", e);
                self.sync_state.write().await.last_error = Some(e.to_string());
                tokio::time::sleep(self.backoff.delay(1)).await;
            }
        }
    }

    /// Replay the head effect once and apply the policy to a failure
    async fn drain_once(&self) -> Result<()> {
        if let Some(head) = self.queue.head().await {
            broadcast_event(
                &self.events,
                QueueEvent::for_effect(
                    head.id,
                    QueueEventKind::ReplayStarted {
                        attempt: head.retry_count + 1,
                    },
                ),
            );
            let mut state = self.sync_state.write().await;
            state.is_syncing = true;
            state.in_flight = Some(head.id);
        }
        self.metrics.write().await.record_attempt_start();

        let outcome = self.executor.replay().await;
        {
            let mut state = self.sync_state.write().await;
            state.is_syncing = false;
            state.in_flight = None;
        }

        match outcome? {
            ReplayOutcome::Idle => {}
            ReplayOutcome::Committed { effect_id, .. } => {
                self.metrics.write().await.record_commit();
                let mut state = self.sync_state.write().await;
                state.last_sync = Some(chrono::Utc::now().to_rfc3339());
                state.last_error = None;
                tracing::debug!("[Sync] {} committed", effect_id);
            }
            ReplayOutcome::Failed { effect, error } => {
                self.metrics.write().await.record_failure();
                self.sync_state.write().await.last_error = Some(error.to_string());
                self.handle_failure(effect, error).await?;
            }
        }

        self.refresh_state().await;
        Ok(())
    }

    async fn handle_failure(&self, effect: MutationEffect, error: SyncError) -> Result<()> {
        match self.policy.decide(&error, &effect, effect.retry_count) {
            Decision::Discard => {
                let completion = self.queue.discard(effect.id, &error).await?;
                self.metrics.write().await.record_discard();
                self.sync_state.write().await.discarded_operations += 1;
                if let Some(completion) = completion {
                    let _ = completion.send(Err(error));
                }
            }
            Decision::RetryAsIs => {
                let retry_count = self.queue.record_failure(effect.id, &error).await?;
                self.metrics.write().await.record_retry();
                let delay = self.backoff.delay(retry_count);
                tracing::debug!(
                    "[Sync] Retry {} of {} in {:?}: {}",
                    retry_count,
                    effect.id,
                    delay,
                    error
                );
                broadcast_event(
                    &self.events,
                    QueueEvent::for_effect(
                        effect.id,
                        QueueEventKind::RetryScheduled {
                            retry_count,
                            delay_ms: delay.as_millis() as u64,
                        },
                    ),
                );
                tokio::time::sleep(delay).await;
            }
            Decision::RetryWith(variables) => {
                tracing::info!("[Sync] Conflict on {} resolved, retrying with new variables", effect.id);
                self.queue.replace_variables(effect.id, variables).await?;
                self.queue.record_failure(effect.id, &error).await?;
                self.metrics.write().await.record_retry();
            }
        }
        Ok(())
    }

    async fn refresh_state(&self) {
        let pending = self.queue.pending_count().await;
        let mut state = self.sync_state.write().await;
        state.pending_operations = pending;
        state.network_status = self.monitor.get_status();
    }
}

/// Background drain loop owner
pub struct SyncService {
    worker: DrainWorker,
    background_task: Option<tokio::task::JoinHandle<()>>,
}

impl SyncService {
    pub fn new(
        executor: Arc<ReplayExecutor>,
        policy: DiscardPolicy,
        queue: Arc<MutationQueue>,
        monitor: NetworkMonitor,
        backoff: BackoffStrategy,
        events: QueueEventBroadcast,
    ) -> Self {
        let sync_state = SyncState {
            network_status: monitor.get_status(),
            ..SyncState::default()
        };
        Self {
            worker: DrainWorker {
                executor,
                policy,
                queue,
                monitor,
                backoff,
                events,
                sync_state: Arc::new(RwLock::new(sync_state)),
                metrics: Arc::new(RwLock::new(ReplayMetrics::new())),
            },
            background_task: None,
        }
    }

    /// Start the background drain loop
    pub fn start(&mut self) {
        if self.is_running() {
            tracing::warn!("[Sync] Sync service is already running");
            return;
        }
        let worker = self.worker.clone();
        self.background_task = Some(tokio::spawn(worker.run()));
    }

    /// Stop the background drain loop
    pub fn stop(&mut self) {
        if let Some(handle) = self.background_task.take() {
            handle.abort();
            tracing::info!("[Sync] Drain loop stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.background_task.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Get current sync status
    pub async fn get_status(&self) -> SyncState {
        self.worker.refresh_state().await;
        self.worker.sync_state.read().await.clone()
    }

    pub async fn metrics(&self) -> ReplayMetrics {
        self.worker.metrics.read().await.clone()
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        if let Some(handle) = self.background_task.take() {
            handle.abort();
        }
    }
}
