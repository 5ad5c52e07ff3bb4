//! # Queue Persistence Operations
//!
//! Row-level storage for queued effects and the key/value queue state.
//!
//! In-flight status is never written: a process that dies mid-replay comes
//! back with the effect queued at the head, and it is sent again
//! (at-least-once delivery).

use super::LocalDatabase;
use crate::client::cache::NormalizedCacheObject;
use crate::client::offline::effect::{EffectStatus, MutationEffect};
use crate::client::offline::id_map::IdMap;
use crate::client::offline::snapshot::CacheSnapshot;
use crate::shared::error::Result;
use serde::de::DeserializeOwned;
use sqlx::{Row, Sqlite, Transaction};
use uuid::Uuid;

/// Metadata key of the identifier map
pub const ID_MAP_KEY: &str = "offline:id_map";
/// Metadata key of the cache snapshot
pub const SNAPSHOT_KEY: &str = "offline:snapshot";
/// Metadata key of the last persisted cache contents
pub const CACHE_KEY: &str = "offline:cache";

/// Everything the queue needs to resume after a restart
#[derive(Debug, Clone, Default)]
pub struct PersistedState {
    /// Queued effects in replay order
    pub effects: Vec<MutationEffect>,
    /// Identifier map
    pub id_map: IdMap,
    /// Rollback snapshot, present while effects are queued
    pub snapshot: Option<CacheSnapshot>,
    /// Cache contents as of the last queue transition
    pub cache: Option<NormalizedCacheObject>,
}

fn decode<T: DeserializeOwned>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("[LocalDb] Ignoring malformed '{}': {}", key, e);
            None
        }
    }
}

async fn metadata_in(tx: &mut Transaction<'_, Sqlite>, key: &str) -> Result<Option<String>> {
    let row = sqlx::query("SELECT value FROM sync_metadata WHERE key = ?")
        .bind(key)
        .fetch_optional(&mut **tx)
        .await?;
    match row {
        Some(row) => Ok(Some(row.try_get("value")?)),
        None => Ok(None),
    }
}

async fn put_metadata_in(tx: &mut Transaction<'_, Sqlite>, key: &str, value: Option<String>) -> Result<()> {
    match value {
        Some(value) => {
            sqlx::query("INSERT OR REPLACE INTO sync_metadata (key, value, updated_at) VALUES (?, ?, ?)")
                .bind(key)
                .bind(value)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&mut **tx)
                .await?;
        }
        None => {
            sqlx::query("DELETE FROM sync_metadata WHERE key = ?")
                .bind(key)
                .execute(&mut **tx)
                .await?;
        }
    }
    Ok(())
}

fn decode_effect(data: &str) -> Option<MutationEffect> {
    match serde_json::from_str::<MutationEffect>(data) {
        Ok(mut effect) => {
            effect.status = EffectStatus::Queued;
            Some(effect)
        }
        Err(e) => {
            tracing::warn!("[LocalDb] Skipping malformed queue row: {}", e);
            None
        }
    }
}

async fn put_queue_state_in(
    tx: &mut Transaction<'_, Sqlite>,
    id_map: &IdMap,
    snapshot: Option<&CacheSnapshot>,
    cache: &NormalizedCacheObject,
) -> Result<()> {
    put_metadata_in(tx, ID_MAP_KEY, Some(serde_json::to_string(id_map)?)).await?;
    put_metadata_in(tx, SNAPSHOT_KEY, snapshot.map(serde_json::to_string).transpose()?).await?;
    put_metadata_in(tx, CACHE_KEY, Some(serde_json::to_string(cache)?)).await?;
    Ok(())
}

impl LocalDatabase {
    /// Append an effect and write the queue state it leaves behind, atomically
    pub async fn enqueue_effect(
        &self,
        effect: &MutationEffect,
        id_map: &IdMap,
        snapshot: Option<&CacheSnapshot>,
        cache: &NormalizedCacheObject,
    ) -> Result<()> {
        let data = serde_json::to_string(effect)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO offline_queue (id, seq, data, created_at, retry_count)
             VALUES (?, (SELECT COALESCE(MAX(seq), 0) + 1 FROM offline_queue), ?, ?, ?)",
        )
        .bind(effect.id.to_string())
        .bind(data)
        .bind(&effect.enqueued_at)
        .bind(i64::from(effect.retry_count))
        .execute(&mut *tx)
        .await?;
        put_queue_state_in(&mut tx, id_map, snapshot, cache).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Remove a committed or discarded effect and write the queue state it
    /// leaves behind, atomically
    ///
    /// A `None` snapshot deletes the stored one.
    pub async fn settle_effect(
        &self,
        effect_id: Uuid,
        id_map: &IdMap,
        snapshot: Option<&CacheSnapshot>,
        cache: &NormalizedCacheObject,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM offline_queue WHERE id = ?")
            .bind(effect_id.to_string())
            .execute(&mut *tx)
            .await?;
        put_queue_state_in(&mut tx, id_map, snapshot, cache).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Persist the identifier map, snapshot and cache together
    pub async fn save_queue_state(
        &self,
        id_map: &IdMap,
        snapshot: Option<&CacheSnapshot>,
        cache: &NormalizedCacheObject,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        put_queue_state_in(&mut tx, id_map, snapshot, cache).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Rewrite a queued effect in place, keeping its position
    pub async fn update_effect(&self, effect: &MutationEffect) -> Result<()> {
        let data = serde_json::to_string(effect)?;
        sqlx::query(
            "UPDATE offline_queue SET
                data = ?,
                retry_count = ?,
                last_attempt = ?,
                error_message = ?
             WHERE id = ?",
        )
        .bind(data)
        .bind(i64::from(effect.retry_count))
        .bind(&effect.last_attempt)
        .bind(&effect.last_error)
        .bind(effect.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Queued effects in replay order
    pub async fn pending_effects(&self) -> Result<Vec<MutationEffect>> {
        let rows = sqlx::query("SELECT data FROM offline_queue ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut effects = Vec::with_capacity(rows.len());
        for row in rows {
            let data: String = row.try_get("data")?;
            effects.extend(decode_effect(&data));
        }
        Ok(effects)
    }

    /// Load the queue, identifier map, snapshot, and cache in one transaction
    pub async fn load_state(&self) -> Result<PersistedState> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query("SELECT data FROM offline_queue ORDER BY seq ASC")
            .fetch_all(&mut *tx)
            .await?;
        let mut effects = Vec::with_capacity(rows.len());
        for row in rows {
            let data: String = row.try_get("data")?;
            effects.extend(decode_effect(&data));
        }

        let id_map = decode(ID_MAP_KEY, metadata_in(&mut tx, ID_MAP_KEY).await?).unwrap_or_default();
        let snapshot = decode(SNAPSHOT_KEY, metadata_in(&mut tx, SNAPSHOT_KEY).await?);
        let cache = decode(CACHE_KEY, metadata_in(&mut tx, CACHE_KEY).await?);

        tx.commit().await?;

        Ok(PersistedState {
            effects,
            id_map,
            snapshot,
            cache,
        })
    }
}
