//! # Mutation Queue
//!
//! Ordered, durable queue of mutation effects. The queue, identifier map and
//! cache snapshot share one lock, so every transition below is atomic with
//! respect to the others and to the drain loop.
//!
//! ## Transitions
//!
//! - `enqueue`: snapshot the cache when the queue goes from empty to non-empty,
//!   register temporary identifiers, persist, write the optimistic result
//! - `begin`: mark the head in flight
//! - `commit`: record server identifiers, rebuild the cache from the snapshot
//!   plus the committed result, advance the snapshot, re-apply the remaining
//!   optimistic results
//! - `discard`: rebuild the cache from the snapshot plus the remaining
//!   optimistic results
//! - `record_failure` / `replace_variables`: keep the effect at the head
//! - `write_confirmed`: fold server data fetched meanwhile into the snapshot
//!   so the next rebuild keeps it
//!
//! Cache rebuilds run under a [`QuietBroadcast`] guard so watchers see one
//! notification per transition.
//!
//! `enqueue`, `commit` and `discard` write the queue row, identifier map,
//! snapshot and cache in one transaction. When that write fails the queue and
//! cache go back to where they were before the transition and the effect,
//! with its continuations, stays queued.
//!
//! Caller continuations (update function, completion channel) cannot be
//! persisted and live only in memory. Effects loaded from disk after a restart
//! commit without them.

use crate::client::cache::{NormalizedCache, NormalizedCacheObject, QuietBroadcast};
use crate::client::local_db::LocalDatabase;
use crate::client::offline::effect::{EffectStatus, MutationEffect};
use crate::client::offline::id_map::{resolve_references, IdMap};
use crate::client::offline::snapshot::CacheSnapshot;
use crate::shared::error::{Result, SyncError};
use crate::shared::event::{broadcast_event, QueueEvent, QueueEventBroadcast, QueueEventKind};
use crate::shared::graphql::Operation;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex, Notify};
use uuid::Uuid;

/// Caller-supplied cache update run with each result of a mutation
pub type UpdateFn = Arc<dyn Fn(&dyn NormalizedCache, &Value) + Send + Sync>;

/// Channel settling the caller's pending mutation
pub type Completion = oneshot::Sender<Result<Value>>;

/// In-memory continuations of a queued effect
#[derive(Default)]
pub struct Continuations {
    /// Cache update run with the optimistic and committed results
    pub update: Option<UpdateFn>,
    /// Completion channel of the original caller
    pub completion: Option<Completion>,
}

/// Result of committing the head effect
pub struct CommitOutcome {
    /// The committed effect
    pub effect: MutationEffect,
    /// Identifiers learned from the server response
    pub learned_ids: Vec<(String, String)>,
    /// Completion channel of the original caller, if still attached
    pub completion: Option<Completion>,
}

/// Queue state and cache contents before a transition
struct Checkpoint {
    effects: VecDeque<MutationEffect>,
    id_map: IdMap,
    snapshot: Option<CacheSnapshot>,
    cache: NormalizedCacheObject,
}

#[derive(Default)]
struct QueueState {
    effects: VecDeque<MutationEffect>,
    id_map: IdMap,
    snapshot: Option<CacheSnapshot>,
    continuations: HashMap<Uuid, Continuations>,
}

impl QueueState {
    fn checkpoint(&self, cache: &dyn NormalizedCache) -> Checkpoint {
        Checkpoint {
            effects: self.effects.clone(),
            id_map: self.id_map.clone(),
            snapshot: self.snapshot.clone(),
            cache: cache.extract(true),
        }
    }

    /// Return to `checkpoint` after a transition could not be persisted
    fn rollback(&mut self, checkpoint: Checkpoint, cache: &dyn NormalizedCache) {
        self.effects = checkpoint.effects;
        self.id_map = checkpoint.id_map;
        self.snapshot = checkpoint.snapshot;
        cache.restore(checkpoint.cache);
    }

    /// Put a taken effect's continuations back after a rollback
    fn requeue(&mut self, effect_id: Uuid, continuations: Continuations) {
        if let Ok(effect) = self.get_mut(effect_id) {
            effect.status = EffectStatus::Queued;
        }
        self.continuations.insert(effect_id, continuations);
    }

    fn take(&mut self, effect_id: Uuid) -> Result<(MutationEffect, Continuations)> {
        let position = self
            .effects
            .iter()
            .position(|e| e.id == effect_id)
            .ok_or_else(|| SyncError::storage(format!("Effect {} is not queued", effect_id)))?;
        let effect = self
            .effects
            .remove(position)
            .ok_or_else(|| SyncError::storage(format!("Effect {} is not queued", effect_id)))?;
        let continuations = self.continuations.remove(&effect_id).unwrap_or_default();
        Ok((effect, continuations))
    }

    fn get_mut(&mut self, effect_id: Uuid) -> Result<&mut MutationEffect> {
        self.effects
            .iter_mut()
            .find(|e| e.id == effect_id)
            .ok_or_else(|| SyncError::storage(format!("Effect {} is not queued", effect_id)))
    }

    /// Reset the identifier map on drain, prune it otherwise
    fn settle_id_map(&mut self) {
        if self.effects.is_empty() {
            self.id_map.clear();
            self.snapshot = None;
            return;
        }
        let pending: HashSet<Uuid> = self.effects.iter().map(|e| e.id).collect();
        let payloads: Vec<Value> = self
            .effects
            .iter()
            .flat_map(|e| {
                std::iter::once(Value::Object(e.operation.variables.clone())).chain(e.optimistic_response.clone())
            })
            .collect();
        self.id_map.prune(&pending, payloads.iter());
    }

    /// Write every queued optimistic result, with known identifiers substituted
    fn reapply_queued(&self, cache: &dyn NormalizedCache) {
        for effect in &self.effects {
            let Some(optimistic) = &effect.optimistic_response else {
                continue;
            };
            let update = self.continuations.get(&effect.id).and_then(|c| c.update.as_ref());
            let applied = resolve_references(optimistic, &self.id_map)
                .and_then(|data| apply_result(cache, &effect.operation, &data, update));
            if let Err(e) = applied {
                tracing::warn!("[Offline] Could not re-apply optimistic result of {}: {}", effect.id, e);
            }
        }
    }
}

/// Write a mutation result and run the caller's update function
///
/// A panicking update function is logged and otherwise ignored.
fn apply_result(cache: &dyn NormalizedCache, operation: &Operation, data: &Value, update: Option<&UpdateFn>) -> Result<()> {
    cache.write_query(operation, data)?;
    if let Some(update) = update {
        if catch_unwind(AssertUnwindSafe(|| update(cache, data))).is_err() {
            tracing::error!("[Offline] Update function panicked for {}", operation.cache_key());
        }
    }
    Ok(())
}

/// Ordered, durable mutation queue
pub struct MutationQueue {
    state: Mutex<QueueState>,
    db: LocalDatabase,
    cache: Arc<dyn NormalizedCache>,
    events: QueueEventBroadcast,
    work: Notify,
}

impl MutationQueue {
    /// Create an empty queue backed by `db`
    pub fn new(db: LocalDatabase, cache: Arc<dyn NormalizedCache>, events: QueueEventBroadcast) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            db,
            cache,
            events,
            work: Notify::new(),
        }
    }

    fn emit(&self, effect_id: Option<Uuid>, kind: QueueEventKind) {
        let event = match effect_id {
            Some(id) => QueueEvent::for_effect(id, kind),
            None => QueueEvent::new(kind),
        };
        broadcast_event(&self.events, event);
    }

    fn identity(&self) -> impl Fn(&Map<String, Value>) -> Option<String> + '_ {
        move |entity| self.cache.data_id_from_object(entity)
    }

    /// Load persisted effects, identifier map, snapshot and cache
    ///
    /// Returns the number of effects loaded.
    pub async fn hydrate(&self) -> Result<usize> {
        let persisted = self.db.load_state().await?;
        let mut state = self.state.lock().await;

        if let Some(content) = persisted.cache {
            self.cache.restore(content);
        }
        state.effects = persisted.effects.into();
        state.id_map = persisted.id_map;
        state.snapshot = persisted.snapshot;
        state.continuations.clear();

        let pending = state.effects.len();
        if pending > 0 && state.snapshot.is_none() {
            tracing::warn!("[Offline] {} effects hydrated without a snapshot", pending);
        }
        tracing::info!("[Offline] Hydrated {} queued effects", pending);
        self.emit(None, QueueEventKind::Hydrated { pending });
        if pending > 0 {
            self.work.notify_one();
        }
        Ok(pending)
    }

    /// Append an effect and apply its optimistic result
    pub async fn enqueue(&self, effect: MutationEffect, continuations: Continuations) -> Result<()> {
        let mut state = self.state.lock().await;
        let checkpoint = state.checkpoint(self.cache.as_ref());

        // Snapshot before the first speculative write of a batch
        let fresh = state.effects.is_empty();
        if fresh {
            state.snapshot = Some(CacheSnapshot::capture(self.cache.as_ref()));
        }
        if let Some(optimistic) = &effect.optimistic_response {
            state.id_map.register(effect.id, optimistic, &self.identity());
        }

        {
            let quiet = QuietBroadcast::acquire(self.cache.as_ref());
            if let Some(optimistic) = &effect.optimistic_response {
                let applied = resolve_references(optimistic, &state.id_map).and_then(|data| {
                    apply_result(quiet.cache(), &effect.operation, &data, continuations.update.as_ref())
                });
                if let Err(e) = applied {
                    tracing::warn!("[Offline] Optimistic write failed for {}: {}", effect.id, e);
                }
            }

            let content = quiet.cache().extract(true);
            let persisted = self
                .db
                .enqueue_effect(&effect, &state.id_map, state.snapshot.as_ref(), &content)
                .await;
            if let Err(e) = persisted {
                tracing::error!("[Offline] Could not persist {}: {}", effect.id, e);
                state.rollback(checkpoint, quiet.cache());
                return Err(e);
            }
        }

        if fresh {
            self.emit(None, QueueEventKind::SnapshotSaved);
        }
        let effect_id = effect.id;
        let mutation_name = effect.mutation_name();
        tracing::debug!(
            "[Offline] Enqueued {} ({})",
            effect_id,
            mutation_name.as_deref().unwrap_or("anonymous")
        );
        state.effects.push_back(effect);
        state.continuations.insert(effect_id, continuations);
        drop(state);

        self.emit(Some(effect_id), QueueEventKind::Enqueued { mutation_name });
        self.work.notify_one();
        Ok(())
    }

    /// Mark the head effect in flight and return it
    pub async fn begin(&self) -> Option<MutationEffect> {
        let mut state = self.state.lock().await;
        let head = state.effects.front_mut()?;
        head.status = EffectStatus::InFlight;
        head.last_attempt = Some(chrono::Utc::now().to_rfc3339());
        Some(head.clone())
    }

    /// Return an in-flight effect to the queued state without counting a failure
    pub async fn release(&self, effect_id: Uuid) {
        let mut state = self.state.lock().await;
        if let Ok(effect) = state.get_mut(effect_id) {
            effect.status = EffectStatus::Queued;
        }
    }

    /// The effect's operation with known server identifiers substituted
    pub async fn substitute(&self, effect: &MutationEffect) -> Result<Operation> {
        let state = self.state.lock().await;
        let variables = resolve_references(&Value::Object(effect.operation.variables.clone()), &state.id_map)?;
        Ok(effect.operation.clone().with_variables(variables))
    }

    /// Settle an effect as committed with the server's `data`
    ///
    /// If the new state cannot be persisted the effect stays queued, keeping
    /// its completion, and is sent again on the next replay.
    pub async fn commit(&self, effect_id: Uuid, data: &Value) -> Result<CommitOutcome> {
        let mut state = self.state.lock().await;
        let checkpoint = state.checkpoint(self.cache.as_ref());
        let (mut effect, continuations) = state.take(effect_id)?;
        effect.status = EffectStatus::Committed;

        let learned_ids = state.id_map.record_commit(effect_id, data, &self.identity());

        {
            let quiet = QuietBroadcast::acquire(self.cache.as_ref());
            if let Some(snapshot) = &state.snapshot {
                snapshot.restore_into(quiet.cache());
            }
            if let Err(e) = apply_result(quiet.cache(), &effect.operation, data, continuations.update.as_ref()) {
                tracing::warn!("[Offline] Could not write committed result of {}: {}", effect_id, e);
            }
            if !state.effects.is_empty() {
                state.snapshot = Some(CacheSnapshot::capture(quiet.cache()));
                state.reapply_queued(quiet.cache());
            }
            state.settle_id_map();

            let content = quiet.cache().extract(true);
            let persisted = self
                .db
                .settle_effect(effect_id, &state.id_map, state.snapshot.as_ref(), &content)
                .await;
            if let Err(e) = persisted {
                tracing::error!("[Offline] Could not persist commit of {}: {}", effect_id, e);
                state.rollback(checkpoint, quiet.cache());
                state.requeue(effect_id, continuations);
                return Err(e);
            }
        }
        let drained = state.effects.is_empty();
        drop(state);

        tracing::info!("[Offline] Committed {} ({} ids learned)", effect_id, learned_ids.len());
        self.emit(Some(effect_id), QueueEventKind::Committed);
        if drained {
            self.emit(None, QueueEventKind::Drained);
        }

        Ok(CommitOutcome {
            effect,
            learned_ids,
            completion: continuations.completion,
        })
    }

    /// Drop an effect permanently and revert its optimistic result
    ///
    /// Returns the caller's completion channel so the error can be delivered.
    /// If the new state cannot be persisted the effect stays queued.
    pub async fn discard(&self, effect_id: Uuid, reason: &SyncError) -> Result<Option<Completion>> {
        let mut state = self.state.lock().await;
        let checkpoint = state.checkpoint(self.cache.as_ref());
        let (effect, continuations) = state.take(effect_id)?;

        {
            let quiet = QuietBroadcast::acquire(self.cache.as_ref());
            if let Some(snapshot) = &state.snapshot {
                snapshot.restore_into(quiet.cache());
            }
            state.reapply_queued(quiet.cache());
            state.settle_id_map();

            let content = quiet.cache().extract(true);
            let persisted = self
                .db
                .settle_effect(effect_id, &state.id_map, state.snapshot.as_ref(), &content)
                .await;
            if let Err(e) = persisted {
                tracing::error!("[Offline] Could not persist discard of {}: {}", effect_id, e);
                state.rollback(checkpoint, quiet.cache());
                state.requeue(effect_id, continuations);
                return Err(e);
            }
        }
        let drained = state.effects.is_empty();
        drop(state);

        tracing::warn!(
            "[Offline] Discarded {} ({}): {}",
            effect_id,
            effect.mutation_name().as_deref().unwrap_or("anonymous"),
            reason
        );
        self.emit(
            Some(effect_id),
            QueueEventKind::Discarded {
                reason: reason.to_string(),
            },
        );
        if drained {
            self.emit(None, QueueEventKind::Drained);
        }
        Ok(continuations.completion)
    }

    /// Write confirmed server data, such as a query result, under the
    /// optimistic layer
    ///
    /// While effects are queued the data also goes into the snapshot, so the
    /// rebuild on the next commit or discard keeps it. Failing to persist the
    /// advanced snapshot is logged; the cache still holds the data.
    pub async fn write_confirmed(&self, operation: &Operation, data: &Value, update: Option<&UpdateFn>) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(snapshot) = &state.snapshot else {
            let quiet = QuietBroadcast::acquire(self.cache.as_ref());
            return apply_result(quiet.cache(), operation, data, update);
        };

        let written;
        {
            let quiet = QuietBroadcast::acquire(self.cache.as_ref());
            snapshot.restore_into(quiet.cache());
            written = apply_result(quiet.cache(), operation, data, update);
            state.snapshot = Some(CacheSnapshot::capture(quiet.cache()));
            state.reapply_queued(quiet.cache());
        }

        let content = self.cache.extract(true);
        if let Err(e) = self
            .db
            .save_queue_state(&state.id_map, state.snapshot.as_ref(), &content)
            .await
        {
            tracing::error!("[Offline] Could not persist confirmed {}: {}", operation.cache_key(), e);
        }
        written
    }

    /// Count a failed attempt; the effect stays at its position
    ///
    /// Returns the updated retry count.
    pub async fn record_failure(&self, effect_id: Uuid, error: &SyncError) -> Result<u32> {
        let mut state = self.state.lock().await;
        let effect = state.get_mut(effect_id)?;
        effect.retry_count += 1;
        effect.status = EffectStatus::Queued;
        effect.last_error = Some(error.to_string());
        let snapshot = effect.clone();
        drop(state);

        self.db.update_effect(&snapshot).await?;
        Ok(snapshot.retry_count)
    }

    /// Replace an effect's variables, e.g. with a conflict resolution
    pub async fn replace_variables(&self, effect_id: Uuid, variables: Map<String, Value>) -> Result<()> {
        let mut state = self.state.lock().await;
        let effect = state.get_mut(effect_id)?;
        effect.operation.variables = variables;
        let updated = effect.clone();
        drop(state);

        self.db.update_effect(&updated).await?;
        self.emit(Some(effect_id), QueueEventKind::VariablesReplaced);
        Ok(())
    }

    /// Wait until an effect may be ready to replay
    pub async fn wait_for_work(&self) {
        self.work.notified().await;
    }

    /// Number of effects not yet committed or discarded
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.effects.len()
    }

    /// Head effect, if any
    pub async fn head(&self) -> Option<MutationEffect> {
        self.state.lock().await.effects.front().cloned()
    }

    /// Queued effects in replay order
    pub async fn effects(&self) -> Vec<MutationEffect> {
        self.state.lock().await.effects.iter().cloned().collect()
    }

    /// Copy of the identifier map
    pub async fn id_map(&self) -> IdMap {
        self.state.lock().await.id_map.clone()
    }

    /// Copy of the live snapshot
    pub async fn snapshot(&self) -> Option<CacheSnapshot> {
        self.state.lock().await.snapshot.clone()
    }

    /// Store backing this queue
    pub fn database(&self) -> &LocalDatabase {
        &self.db
    }
}
