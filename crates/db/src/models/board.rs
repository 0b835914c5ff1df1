use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};

use super::{de, json_text};

/// A discussion board belonging to a project.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Board {
    pub id: i64,
    pub external_id: String,
    /// External id of the owning project
    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    pub position: Option<i64>,
    pub section: Option<String>,
    pub subject_default: Option<bool>,
    pub users_count: Option<i64>,
    pub comments_count: Option<i64>,
    /// Discussion count reported upstream when the board was imported
    pub discussions_count: i64,
    pub last_comment_created_at: Option<String>,
    pub created_at: Option<String>,
    pub parent_id: Option<String>,
    pub links: Option<String>,
    pub href: Option<String>,
    pub imported_at: DateTime<Utc>,
}

/// A board as returned by the `boards` listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBoard {
    #[serde(rename = "id", deserialize_with = "de::string_or_number")]
    pub external_id: String,
    #[serde(deserialize_with = "de::string_or_number")]
    pub project_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub subject_default: Option<bool>,
    #[serde(default)]
    pub users_count: Option<i64>,
    #[serde(default)]
    pub comments_count: Option<i64>,
    #[serde(default)]
    pub discussions_count: Option<i64>,
    #[serde(default)]
    pub last_comment_created_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub links: Option<serde_json::Value>,
    #[serde(default)]
    pub href: Option<String>,
}

impl Board {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Board>("SELECT * FROM boards ORDER BY id ASC")
            .fetch_all(pool)
            .await
    }

    pub fn stream_all(pool: &SqlitePool) -> BoxStream<'_, Result<Self, sqlx::Error>> {
        sqlx::query_as::<_, Board>("SELECT * FROM boards ORDER BY id ASC").fetch(pool)
    }

    pub async fn find_by_external_id(
        pool: &SqlitePool,
        external_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Board>("SELECT * FROM boards WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn exists(pool: &SqlitePool, external_id: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM boards WHERE external_id = $1)")
            .bind(external_id)
            .fetch_one(pool)
            .await
    }

    pub async fn create(pool: &SqlitePool, data: &CreateBoard) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Board>(
            r#"INSERT INTO boards (
                external_id, project_id, title, description, position, section,
                subject_default, users_count, comments_count, discussions_count,
                last_comment_created_at, created_at, parent_id, links, href
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *"#,
        )
        .bind(&data.external_id)
        .bind(&data.project_id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.position)
        .bind(&data.section)
        .bind(data.subject_default)
        .bind(data.users_count)
        .bind(data.comments_count)
        .bind(data.discussions_count.unwrap_or(0))
        .bind(&data.last_comment_created_at)
        .bind(&data.created_at)
        .bind(&data.parent_id)
        .bind(json_text(&data.links))
        .bind(&data.href)
        .fetch_one(pool)
        .await
    }

    pub async fn count_by_project(pool: &SqlitePool, project_id: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM boards WHERE project_id = $1")
            .bind(project_id)
            .fetch_one(pool)
            .await
    }

    pub async fn delete_by_project<'e, E>(executor: E, project_id: &str) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM boards WHERE project_id = $1")
            .bind(project_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete<'e, E>(executor: E, external_id: &str) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM boards WHERE external_id = $1")
            .bind(external_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}
