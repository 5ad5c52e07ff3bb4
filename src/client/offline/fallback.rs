//! Query fallback
//!
//! While offline, queries are answered from the cache alone: one immediate
//! result, no network attempt, nothing left pending.

use crate::client::cache::NormalizedCache;
use crate::shared::error::{Result, SyncError};
use crate::shared::graphql::Operation;
use serde_json::Value;
use std::sync::Arc;

/// Serves queries from the local cache
#[derive(Clone)]
pub struct QueryFallbackReader {
    cache: Arc<dyn NormalizedCache>,
}

impl QueryFallbackReader {
    pub fn new(cache: Arc<dyn NormalizedCache>) -> Self {
        Self { cache }
    }

    /// Read `query` from the cache
    pub fn read(&self, query: &Operation) -> Result<Value> {
        if query.is_mutation() {
            return Err(SyncError::validation("operation", "Mutations cannot be read from the cache"));
        }
        tracing::debug!("[Offline] Serving {} from cache", query.cache_key());
        self.cache.read_query(query)
    }
}
