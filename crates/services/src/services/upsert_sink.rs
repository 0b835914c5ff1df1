//! Idempotent persistence of listing records.

use serde_json::Value;
use sqlx::SqlitePool;
use thiserror::Error;

use super::kinds::ChildKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    AlreadyExists,
}

#[derive(Debug, Error)]
pub enum UpsertError {
    #[error("Invalid {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Writes records of one kind, skipping those already stored.
pub struct UpsertSink<'a, K: ChildKind> {
    pool: &'a SqlitePool,
    kind: &'a K,
}

impl<'a, K: ChildKind> UpsertSink<'a, K> {
    pub fn new(pool: &'a SqlitePool, kind: &'a K) -> Self {
        Self { pool, kind }
    }

    /// Decode one raw listing item, then upsert it.
    pub async fn upsert_value(&self, value: Value) -> Result<UpsertOutcome, UpsertError> {
        let item: K::Item =
            serde_json::from_value(value).map_err(|source| UpsertError::Payload {
                kind: K::NAME,
                source,
            })?;
        Ok(self.upsert(&item).await?)
    }

    pub async fn upsert(&self, item: &K::Item) -> Result<UpsertOutcome, sqlx::Error> {
        let external_id = self.kind.external_id(item);
        if self.kind.exists(self.pool, external_id).await? {
            tracing::debug!(kind = K::NAME, external_id, "Record already exists");
            return Ok(UpsertOutcome::AlreadyExists);
        }

        match self.kind.insert(self.pool, item).await {
            Ok(()) => {
                tracing::debug!(kind = K::NAME, external_id, "Created record");
                Ok(UpsertOutcome::Inserted)
            }
            // Lost a race with another writer between the lookup and the insert
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Ok(UpsertOutcome::AlreadyExists)
            }
            Err(e) => Err(e),
        }
    }
}

/// Remove line breaks from free text so exported rows stay on one line.
pub fn strip_newlines(text: &str) -> String {
    text.chars().filter(|c| *c != '\n' && *c != '\r').collect()
}

pub fn strip_newlines_opt(text: &Option<String>) -> Option<String> {
    text.as_deref().map(strip_newlines)
}
