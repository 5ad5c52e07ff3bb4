//! # Replay Executor
//!
//! One network attempt for the head of the queue. The executor holds explicit
//! handles to everything it touches (intercept, queue, hydration gate);
//! the drain loop in [`super::SyncService`] decides what to do with failures.
//!
//! ## Attempt
//!
//! 1. Wait for the hydration gate
//! 2. Substitute known server identifiers into the variables
//! 3. Send a replay-flagged request through the intercept
//! 4. On success commit: record server identifiers, rebuild the cache, run
//!    refetch queries, settle the caller
//! 5. On failure hand the error back untouched

use crate::client::offline::effect::MutationEffect;
use crate::client::offline::intercept::{Dispatched, MutationContext, MutationIntercept};
use crate::client::offline::queue::MutationQueue;
use crate::shared::error::{Result, SyncError};
use crate::shared::graphql::Operation;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Refetch queries in flight at once after a commit
const REFETCH_CONCURRENCY: usize = 4;

/// One-time gate opened once persisted state has been loaded
#[derive(Debug, Clone)]
pub struct HydrationGate {
    open_tx: Arc<watch::Sender<bool>>,
}

impl HydrationGate {
    /// A closed gate
    pub fn new() -> Self {
        let (open_tx, _) = watch::channel(false);
        Self {
            open_tx: Arc::new(open_tx),
        }
    }

    /// Open the gate; later calls have no effect
    pub fn open(&self) {
        self.open_tx.send_replace(true);
    }

    pub fn is_open(&self) -> bool {
        *self.open_tx.borrow()
    }

    /// Resolve once the gate is open
    pub async fn wait(&self) {
        let mut rx = self.open_tx.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

impl Default for HydrationGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one replay attempt
#[derive(Debug)]
pub enum ReplayOutcome {
    /// Nothing queued
    Idle,
    /// The head effect committed
    Committed { effect_id: Uuid, data: Value },
    /// The head effect failed and is still queued
    Failed { effect: MutationEffect, error: SyncError },
}

pub struct ReplayExecutor {
    intercept: Arc<MutationIntercept>,
    queue: Arc<MutationQueue>,
    gate: HydrationGate,
}

impl ReplayExecutor {
    pub fn new(intercept: Arc<MutationIntercept>, queue: Arc<MutationQueue>, gate: HydrationGate) -> Self {
        Self {
            intercept,
            queue,
            gate,
        }
    }

    pub fn gate(&self) -> &HydrationGate {
        &self.gate
    }

    /// Attempt the head effect once
    ///
    /// `Err` means local bookkeeping failed; network and backend failures come
    /// back as [`ReplayOutcome::Failed`].
    pub async fn replay(&self) -> Result<ReplayOutcome> {
        self.gate.wait().await;

        let Some(effect) = self.queue.begin().await else {
            return Ok(ReplayOutcome::Idle);
        };

        let operation = match self.queue.substitute(&effect).await {
            Ok(operation) => operation,
            Err(error) => return Ok(ReplayOutcome::Failed { effect, error }),
        };

        tracing::debug!(
            "[Sync] Replaying {} (attempt {})",
            effect.id,
            effect.retry_count + 1
        );

        let response = match self.intercept.dispatch(operation, MutationContext::new().replay()).await {
            Ok(Dispatched::Forwarded(response)) => response,
            Ok(Dispatched::Queued { .. }) => {
                return Err(SyncError::storage(format!("Replay of {} was queued again", effect.id)));
            }
            Err(error) => return Ok(ReplayOutcome::Failed { effect, error }),
        };

        if !response.errors.is_empty() {
            return Ok(ReplayOutcome::Failed {
                effect,
                error: SyncError::graphql(response.errors),
            });
        }

        let data = response.data.unwrap_or(Value::Null);
        let outcome = self.queue.commit(effect.id, &data).await?;
        self.refetch(&outcome.effect.refetch_queries).await;

        if let Some(completion) = outcome.completion {
            // The caller may have stopped waiting
            let _ = completion.send(Ok(data.clone()));
        }

        Ok(ReplayOutcome::Committed {
            effect_id: effect.id,
            data,
        })
    }

    /// Re-run queries and write their results; failures are logged
    async fn refetch(&self, queries: &[Operation]) {
        stream::iter(queries)
            .for_each_concurrent(REFETCH_CONCURRENCY, |query| async move {
                match self.intercept.transport().execute(query).await {
                    Ok(response) if response.errors.is_empty() => {
                        if let Some(data) = response.data {
                            if let Err(e) = self.queue.write_confirmed(query, &data, None).await {
                                tracing::warn!("[Sync] Could not cache refetch of {}: {}", query.cache_key(), e);
                            }
                        }
                    }
                    Ok(response) => {
                        tracing::warn!(
                            "[Sync] Refetch of {} failed: {}",
                            query.cache_key(),
                            SyncError::graphql(response.errors)
                        );
                    }
                    Err(e) => tracing::warn!("[Sync] Refetch of {} failed: {}", query.cache_key(), e),
                }
            })
            .await;
    }
}
