//! Cache snapshots
//!
//! The rollback target for speculative writes: a copy of the confirmed cache
//! content, taken before the first effect of a batch is enqueued and advanced
//! each time an effect commits.

use crate::client::cache::{NormalizedCache, NormalizedCacheObject};
use serde::{Deserialize, Serialize};

/// Copy of the cache without the optimistic layer
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CacheSnapshot {
    /// Extracted cache content
    pub content: NormalizedCacheObject,
    /// Timestamp when taken
    pub taken_at: String,
}

impl CacheSnapshot {
    /// Extract the confirmed content of `cache`
    pub fn capture(cache: &dyn NormalizedCache) -> Self {
        Self {
            content: cache.extract(false),
            taken_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Replace the contents of `cache` with this snapshot
    pub fn restore_into(&self, cache: &dyn NormalizedCache) {
        cache.restore(self.content.clone());
    }

    /// Number of cache records held
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Whether the snapshot holds no records
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
