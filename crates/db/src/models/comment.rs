use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};

use super::{de, json_text};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub external_id: String,
    /// External id of the owning discussion
    pub discussion_id: String,
    pub board_id: Option<String>,
    pub project_id: Option<String>,
    pub body: Option<String>,
    pub category: Option<String>,
    pub created_at: Option<String>,
    pub href: Option<String>,
    pub links: Option<String>,
    pub discussion_comments_count: Option<i64>,
    pub board_comments_count: Option<i64>,
    pub board_description: Option<String>,
    pub board_discussions_count: Option<i64>,
    pub board_parent_id: Option<String>,
    pub board_subject_default: Option<bool>,
    pub board_title: Option<String>,
    pub board_users_count: Option<i64>,
    pub project_slug: Option<String>,
    pub project_title: Option<String>,
    pub user_id: Option<String>,
    pub user_login: Option<String>,
    pub user_display_name: Option<String>,
    pub imported_at: DateTime<Utc>,
}

/// A comment as returned by the `comments` listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateComment {
    #[serde(rename = "id", deserialize_with = "de::string_or_number")]
    pub external_id: String,
    #[serde(deserialize_with = "de::string_or_number")]
    pub discussion_id: String,
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub board_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub links: Option<serde_json::Value>,
    #[serde(default)]
    pub discussion_comments_count: Option<i64>,
    #[serde(default)]
    pub board_comments_count: Option<i64>,
    #[serde(default)]
    pub board_description: Option<String>,
    #[serde(default)]
    pub board_discussions_count: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub board_parent_id: Option<String>,
    #[serde(default)]
    pub board_subject_default: Option<bool>,
    #[serde(default)]
    pub board_title: Option<String>,
    #[serde(default)]
    pub board_users_count: Option<i64>,
    #[serde(default)]
    pub project_slug: Option<String>,
    #[serde(default)]
    pub project_title: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_login: Option<String>,
    #[serde(default)]
    pub user_display_name: Option<String>,
}

impl Comment {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Comment>("SELECT * FROM comments ORDER BY id ASC")
            .fetch_all(pool)
            .await
    }

    /// Stream every comment; the table is too large to collect.
    pub fn stream_all(pool: &SqlitePool) -> BoxStream<'_, Result<Self, sqlx::Error>> {
        sqlx::query_as::<_, Comment>("SELECT * FROM comments ORDER BY id ASC").fetch(pool)
    }

    pub async fn find_by_external_id(
        pool: &SqlitePool,
        external_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn exists(pool: &SqlitePool, external_id: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM comments WHERE external_id = $1)",
        )
        .bind(external_id)
        .fetch_one(pool)
        .await
    }

    pub async fn create(pool: &SqlitePool, data: &CreateComment) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Comment>(
            r#"INSERT INTO comments (
                external_id, discussion_id, board_id, project_id, body, category, created_at,
                href, links, discussion_comments_count, board_comments_count, board_description,
                board_discussions_count, board_parent_id, board_subject_default, board_title,
                board_users_count, project_slug, project_title, user_id, user_login,
                user_display_name
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21, $22
            )
            RETURNING *"#,
        )
        .bind(&data.external_id)
        .bind(&data.discussion_id)
        .bind(&data.board_id)
        .bind(&data.project_id)
        .bind(&data.body)
        .bind(&data.category)
        .bind(&data.created_at)
        .bind(&data.href)
        .bind(json_text(&data.links))
        .bind(data.discussion_comments_count)
        .bind(data.board_comments_count)
        .bind(&data.board_description)
        .bind(data.board_discussions_count)
        .bind(&data.board_parent_id)
        .bind(data.board_subject_default)
        .bind(&data.board_title)
        .bind(data.board_users_count)
        .bind(&data.project_slug)
        .bind(&data.project_title)
        .bind(&data.user_id)
        .bind(&data.user_login)
        .bind(&data.user_display_name)
        .fetch_one(pool)
        .await
    }

    pub async fn count_by_discussion(
        pool: &SqlitePool,
        discussion_id: &str,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comments WHERE discussion_id = $1")
            .bind(discussion_id)
            .fetch_one(pool)
            .await
    }

    pub async fn delete_by_discussion<'e, E>(executor: E, discussion_id: &str) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM comments WHERE discussion_id = $1")
            .bind(discussion_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete the comments of every discussion stored under `board_id`.
    /// Runs against the discussions table, so it must precede their delete.
    pub async fn delete_by_board<'e, E>(executor: E, board_id: &str) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"DELETE FROM comments
               WHERE discussion_id IN (SELECT external_id FROM discussions WHERE board_id = $1)"#,
        )
        .bind(board_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete<'e, E>(executor: E, external_id: &str) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM comments WHERE external_id = $1")
            .bind(external_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}
