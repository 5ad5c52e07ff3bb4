//! # In-Memory Reference Cache
//!
//! A small [`NormalizedCache`] implementation. Operation results are stored
//! under the operation's cache key and every entity found in a result is merged
//! into a `"Typename:id"` record. Reads overlay the latest entity records onto
//! the stored result, so a mutation that changes an entity is visible to every
//! query that selected it.
//!
//! There is no separate optimistic layer: optimistic writes land in the same
//! records as confirmed ones, and the sync layer reverts them through snapshots.

use super::{default_data_id, NormalizedCache, NormalizedCacheObject};
use crate::shared::error::{Result, SyncError};
use crate::shared::graphql::Operation;
use serde_json::{Map, Value};
use std::sync::{PoisonError, RwLock};
use tokio::sync::watch;

#[derive(Debug, Default)]
struct MemoryCacheState {
    entries: NormalizedCacheObject,
    silenced: bool,
    broadcasts: u64,
}

/// In-memory normalized cache
#[derive(Debug)]
pub struct MemoryCache {
    state: RwLock<MemoryCacheState>,
    watch_tx: watch::Sender<u64>,
}

impl MemoryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        let (watch_tx, _) = watch::channel(0);
        Self {
            state: RwLock::new(MemoryCacheState::default()),
            watch_tx,
        }
    }

    /// Receive the broadcast counter every time watchers are notified
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.watch_tx.subscribe()
    }

    /// Number of broadcasts so far
    pub fn broadcast_count(&self) -> u64 {
        self.state.read().unwrap_or_else(PoisonError::into_inner).broadcasts
    }

    /// Whether broadcasting is currently suspended
    pub fn is_broadcast_silenced(&self) -> bool {
        self.state.read().unwrap_or_else(PoisonError::into_inner).silenced
    }

    /// Stored record for a cache id
    pub fn entry(&self, id: &str) -> Option<Value> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(id)
            .cloned()
    }

    fn notify(&self, force: bool) {
        let count = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if state.silenced && !force {
                return;
            }
            state.broadcasts += 1;
            state.broadcasts
        };
        self.watch_tx.send_replace(count);
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_entities(value: &Value, out: &mut Vec<(String, Map<String, Value>)>) {
    match value {
        Value::Object(map) => {
            if let Some(id) = default_data_id(map) {
                out.push((id, map.clone()));
            }
            map.values().for_each(|child| collect_entities(child, out));
        }
        Value::Array(items) => items.iter().for_each(|child| collect_entities(child, out)),
        _ => {}
    }
}

fn overlay(value: &Value, entries: &NormalizedCacheObject) -> Value {
    match value {
        Value::Object(map) => {
            let record = default_data_id(map)
                .and_then(|id| entries.get(&id))
                .and_then(Value::as_object);
            let fields = map
                .iter()
                .map(|(key, child)| {
                    let latest = record.and_then(|r| r.get(key)).unwrap_or(child);
                    (key.clone(), overlay(latest, entries))
                })
                .collect();
            Value::Object(fields)
        }
        Value::Array(items) => Value::Array(items.iter().map(|item| overlay(item, entries)).collect()),
        other => other.clone(),
    }
}

impl NormalizedCache for MemoryCache {
    fn extract(&self, _include_optimistic: bool) -> NormalizedCacheObject {
        self.state.read().unwrap_or_else(PoisonError::into_inner).entries.clone()
    }

    fn restore(&self, content: NormalizedCacheObject) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).entries = content;
        self.notify(false);
    }

    fn read_query(&self, query: &Operation) -> Result<Value> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let key = query.cache_key();
        let stored = state
            .entries
            .get(&key)
            .ok_or_else(|| SyncError::CacheMiss { key: key.clone() })?;
        Ok(overlay(stored, &state.entries))
    }

    fn write_query(&self, operation: &Operation, data: &Value) -> Result<()> {
        let mut entities = Vec::new();
        collect_entities(data, &mut entities);
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            for (id, fields) in entities {
                let record = state
                    .entries
                    .entry(id)
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(existing) = record {
                    existing.extend(fields);
                }
            }
            state.entries.insert(operation.cache_key(), data.clone());
        }
        self.notify(false);
        Ok(())
    }

    fn set_broadcast_silenced(&self, silenced: bool) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut state.silenced, silenced)
    }

    fn broadcast_watches(&self) {
        self.notify(true);
    }
}
