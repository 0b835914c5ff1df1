//! Row counts for the `status` command.

use serde::Serialize;
use sqlx::SqlitePool;

/// How much of the upstream has been materialized locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseStats {
    pub project_count: i64,
    pub board_count: i64,
    pub discussion_count: i64,
    pub comment_count: i64,
    pub popular_tag_count: i64,
    /// Number of fully processed listing pages
    pub checkpoint_count: i64,
}

async fn count_rows(pool: &SqlitePool, table: &str) -> Result<i64, sqlx::Error> {
    // Table names come from the fixed list below, never from input.
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
}

pub async fn get_database_stats(pool: &SqlitePool) -> Result<DatabaseStats, sqlx::Error> {
    Ok(DatabaseStats {
        project_count: count_rows(pool, "projects").await?,
        board_count: count_rows(pool, "boards").await?,
        discussion_count: count_rows(pool, "discussions").await?,
        comment_count: count_rows(pool, "comments").await?,
        popular_tag_count: count_rows(pool, "popular_tags").await?,
        checkpoint_count: count_rows(pool, "cache_entries").await?,
    })
}
