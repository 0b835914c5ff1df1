use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};

use super::de;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Discussion {
    pub id: i64,
    pub external_id: String,
    /// External id of the owning board
    pub board_id: String,
    pub title: String,
    pub href: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub last_comment_created_at: Option<String>,
    /// Comment count reported upstream when the discussion was imported
    pub comments_count: i64,
    pub users_count: Option<i64>,
    pub user_id: Option<String>,
    pub user_login: Option<String>,
    pub user_display_name: Option<String>,
    pub project_id: Option<String>,
    pub project_slug: Option<String>,
    pub project_title: Option<String>,
    pub focus_id: Option<String>,
    pub section: Option<String>,
    pub locked: Option<bool>,
    pub sticky: Option<bool>,
    pub subject_default: Option<bool>,
    pub board_comments_count: Option<i64>,
    pub board_description: Option<String>,
    pub board_discussions_count: Option<i64>,
    pub board_parent_id: Option<String>,
    pub board_subject_default: Option<bool>,
    pub board_title: Option<String>,
    pub board_users_count: Option<i64>,
    pub imported_at: DateTime<Utc>,
}

/// A discussion as returned by the `discussions` listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDiscussion {
    #[serde(rename = "id", deserialize_with = "de::string_or_number")]
    pub external_id: String,
    #[serde(deserialize_with = "de::string_or_number")]
    pub board_id: String,
    pub title: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub last_comment_created_at: Option<String>,
    #[serde(default)]
    pub comments_count: Option<i64>,
    #[serde(default)]
    pub users_count: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_login: Option<String>,
    #[serde(default)]
    pub user_display_name: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub project_slug: Option<String>,
    #[serde(default)]
    pub project_title: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub focus_id: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub locked: Option<bool>,
    #[serde(default)]
    pub sticky: Option<bool>,
    #[serde(default)]
    pub subject_default: Option<bool>,
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
}

impl Discussion {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Discussion>("SELECT * FROM discussions ORDER BY id ASC")
            .fetch_all(pool)
            .await
    }

    pub fn stream_all(pool: &SqlitePool) -> BoxStream<'_, Result<Self, sqlx::Error>> {
        sqlx::query_as::<_, Discussion>("SELECT * FROM discussions ORDER BY id ASC").fetch(pool)
    }

    pub async fn find_by_external_id(
        pool: &SqlitePool,
        external_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Discussion>("SELECT * FROM discussions WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn exists(pool: &SqlitePool, external_id: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM discussions WHERE external_id = $1)",
        )
        .bind(external_id)
        .fetch_one(pool)
        .await
    }

    pub async fn create(pool: &SqlitePool, data: &CreateDiscussion) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Discussion>(
            r#"INSERT INTO discussions (
                external_id, board_id, title, href, created_at, updated_at,
                last_comment_created_at, comments_count, users_count, user_id, user_login,
                user_display_name, project_id, project_slug, project_title, focus_id, section,
                locked, sticky, subject_default, board_comments_count, board_description,
                board_discussions_count, board_parent_id, board_subject_default, board_title,
                board_users_count
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21, $22, $23, $24, $25, $26, $27
            )
            RETURNING *"#,
        )
        .bind(&data.external_id)
        .bind(&data.board_id)
        .bind(&data.title)
        .bind(&data.href)
        .bind(&data.created_at)
        .bind(&data.updated_at)
        .bind(&data.last_comment_created_at)
        .bind(data.comments_count.unwrap_or(0))
        .bind(data.users_count)
        .bind(&data.user_id)
        .bind(&data.user_login)
        .bind(&data.user_display_name)
        .bind(&data.project_id)
        .bind(&data.project_slug)
        .bind(&data.project_title)
        .bind(&data.focus_id)
        .bind(&data.section)
        .bind(data.locked)
        .bind(data.sticky)
        .bind(data.subject_default)
        .bind(data.board_comments_count)
        .bind(&data.board_description)
        .bind(data.board_discussions_count)
        .bind(&data.board_parent_id)
        .bind(data.board_subject_default)
        .bind(&data.board_title)
        .bind(data.board_users_count)
        .fetch_one(pool)
        .await
    }

    pub async fn count_by_board(pool: &SqlitePool, board_id: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM discussions WHERE board_id = $1")
            .bind(board_id)
            .fetch_one(pool)
            .await
    }

    pub async fn external_ids_by_board<'e, E>(
        executor: E,
        board_id: &str,
    ) -> Result<Vec<String>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, String>(
            "SELECT external_id FROM discussions WHERE board_id = $1 ORDER BY id",
        )
        .bind(board_id)
        .fetch_all(executor)
        .await
    }

    pub async fn delete_by_board<'e, E>(executor: E, board_id: &str) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM discussions WHERE board_id = $1")
            .bind(board_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete<'e, E>(executor: E, external_id: &str) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM discussions WHERE external_id = $1")
            .bind(external_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}
