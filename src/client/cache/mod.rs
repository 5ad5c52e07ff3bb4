//! # Normalized Cache Boundary
//!
//! The sync layer does not own a GraphQL cache. It talks to one through the
//! [`NormalizedCache`] trait: extract/restore whole contents (for snapshots),
//! read and write query results, toggle change broadcasting, and compute the
//! identity key of an entity.
//!
//! [`QuietBroadcast`] is the scoped form of the broadcast toggle: while the
//! guard lives the cache does not notify watchers, and dropping it restores the
//! previous state and broadcasts once. Dropping happens on every exit path,
//! including a panic inside a user update function.
//!
//! [`MemoryCache`] is a small reference implementation used by tests and the
//! inspection tool.

pub mod memory;

pub use memory::MemoryCache;

use crate::shared::error::Result;
use crate::shared::graphql::Operation;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Whole-cache contents keyed by cache id (`"Typename:id"` or a root query key)
pub type NormalizedCacheObject = BTreeMap<String, Value>;

/// Operations the sync layer needs from a normalized cache
///
/// Implementations use interior mutability; the sync layer only ever calls
/// them from its single scheduling context.
pub trait NormalizedCache: Send + Sync {
    /// Full contents, with or without the optimistic layer
    fn extract(&self, include_optimistic: bool) -> NormalizedCacheObject;

    /// Replace the full contents
    fn restore(&self, content: NormalizedCacheObject);

    /// Run a query against cached data
    fn read_query(&self, query: &Operation) -> Result<Value>;

    /// Write an operation result into the cache, normalizing its entities
    fn write_query(&self, operation: &Operation, data: &Value) -> Result<()>;

    /// Suspend or resume change notifications; returns the previous setting
    fn set_broadcast_silenced(&self, silenced: bool) -> bool;

    /// Notify watchers of the current contents
    fn broadcast_watches(&self);

    /// Cache key of an entity, or `None` when it has no identity
    ///
    /// Temporary identifiers are read from the part after the last `:`
    /// (`Typename:id`), or from the whole key when it has no `:`.
    fn data_id_from_object(&self, entity: &Map<String, Value>) -> Option<String> {
        default_data_id(entity)
    }
}

/// `"Typename:id"` from `__typename` and `id` (or `_id`)
pub fn default_data_id(entity: &Map<String, Value>) -> Option<String> {
    let typename = entity.get("__typename")?.as_str()?;
    let id = entity.get("id").or_else(|| entity.get("_id"))?;
    match id {
        Value::String(id) => Some(format!("{}:{}", typename, id)),
        Value::Number(id) => Some(format!("{}:{}", typename, id)),
        _ => None,
    }
}

/// Quiet-mode guard around a batch of cache writes
pub struct QuietBroadcast<'a> {
    cache: &'a dyn NormalizedCache,
    previous: bool,
}

impl<'a> QuietBroadcast<'a> {
    /// Silence broadcasting until the guard is dropped
    pub fn acquire(cache: &'a dyn NormalizedCache) -> Self {
        let previous = cache.set_broadcast_silenced(true);
        Self { cache, previous }
    }

    /// The guarded cache
    pub fn cache(&self) -> &'a dyn NormalizedCache {
        self.cache
    }
}

impl Drop for QuietBroadcast<'_> {
    fn drop(&mut self) {
        self.cache.set_broadcast_silenced(self.previous);
        // Nested guards leave the broadcast to the outermost one
        if !self.previous {
            self.cache.broadcast_watches();
        }
    }
}
