use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// A durable "this listing page was fully processed" marker.
///
/// `key` is the relative request target of the page and `value` its
/// pagination envelope serialized as JSON. Rows are never updated.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, CacheEntry>("SELECT key, value, created_at FROM cache_entries")
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_key(pool: &SqlitePool, key: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, CacheEntry>(
            "SELECT key, value, created_at FROM cache_entries WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(pool)
        .await
    }

    /// Insert the entry unless the key is already present.
    ///
    /// Returns `true` if a row was written.
    pub async fn insert_if_absent(
        pool: &SqlitePool,
        key: &str,
        value: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO cache_entries (key, value) VALUES ($1, $2) ON CONFLICT(key) DO NOTHING",
        )
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every entry whose key starts with `prefix`.
    ///
    /// Compared with `substr` rather than `LIKE`: keys contain `_`, which
    /// `LIKE` treats as a wildcard.
    pub async fn delete_by_prefix(pool: &SqlitePool, prefix: &str) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM cache_entries WHERE substr(key, 1, length($1)) = $1")
                .bind(prefix)
                .execute(pool)
                .await?;
        Ok(result.rows_affected())
    }
}
