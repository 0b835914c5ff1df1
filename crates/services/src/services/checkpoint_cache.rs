//! Durable record of fully processed listing pages.
//!
//! Entries live in the `cache_entries` table and are mirrored in memory so
//! that skipping through hundreds of thousands of already imported parents
//! does not cost a query per page. The mirror only ever holds entries that
//! are known to be durable.

use std::collections::HashMap;

use db::models::cache_entry::CacheEntry;
use sqlx::SqlitePool;
use thiserror::Error;

use super::pagination::{PageEnvelope, PageKey};

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("Invalid checkpoint envelope for {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub struct CheckpointCache {
    pool: SqlitePool,
    mirror: HashMap<String, PageEnvelope>,
}

impl CheckpointCache {
    /// Start with every durable entry preloaded.
    pub async fn load(pool: SqlitePool) -> Result<Self, CheckpointError> {
        let entries = CacheEntry::find_all(&pool).await?;
        let mut mirror = HashMap::with_capacity(entries.len());
        for entry in entries {
            let envelope = decode(&entry.key, &entry.value)?;
            mirror.insert(entry.key, envelope);
        }
        tracing::info!(checkpoints = mirror.len(), "Loaded page checkpoints");
        Ok(Self { pool, mirror })
    }

    /// Start with an empty mirror; entries are read on demand.
    pub fn empty(pool: SqlitePool) -> Self {
        Self {
            pool,
            mirror: HashMap::new(),
        }
    }

    pub fn mirrored_len(&self) -> usize {
        self.mirror.len()
    }

    pub async fn get(&mut self, key: &PageKey) -> Result<Option<PageEnvelope>, CheckpointError> {
        let cache_key = key.cache_key();
        if let Some(envelope) = self.mirror.get(&cache_key) {
            return Ok(Some(*envelope));
        }

        let Some(entry) = CacheEntry::find_by_key(&self.pool, &cache_key).await? else {
            return Ok(None);
        };
        let envelope = decode(&entry.key, &entry.value)?;
        self.mirror.insert(cache_key, envelope);
        Ok(Some(envelope))
    }

    /// Record `key` as processed. An existing entry is left untouched.
    pub async fn put(&mut self, key: &PageKey, envelope: &PageEnvelope) -> Result<(), CheckpointError> {
        let cache_key = key.cache_key();
        if self.mirror.contains_key(&cache_key) {
            return Ok(());
        }

        let value = serde_json::to_string(envelope).map_err(|source| CheckpointError::Decode {
            key: cache_key.clone(),
            source,
        })?;
        if !CacheEntry::insert_if_absent(&self.pool, &cache_key, &value).await? {
            tracing::debug!(key = %cache_key, "Checkpoint already present");
        }
        self.mirror.insert(cache_key, *envelope);
        Ok(())
    }

    /// Remove every checkpoint whose key starts with `prefix`.
    pub async fn invalidate(&mut self, prefix: &str) -> Result<u64, CheckpointError> {
        let removed = CacheEntry::delete_by_prefix(&self.pool, prefix).await?;
        self.mirror.retain(|key, _| !key.starts_with(prefix));
        Ok(removed)
    }
}

fn decode(key: &str, value: &str) -> Result<PageEnvelope, CheckpointError> {
    serde_json::from_str(value).map_err(|source| CheckpointError::Decode {
        key: key.to_string(),
        source,
    })
}
