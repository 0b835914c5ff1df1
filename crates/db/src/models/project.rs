use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};

use super::{de, json_text};

/// A project seeded from the local project listing files.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub external_id: String,
    pub display_name: String,
    pub description: Option<String>,
    pub avatar_src: Option<String>,
    pub classifications_count: Option<i64>,
    pub completeness: Option<f64>,
    pub launch_approved: Option<bool>,
    /// Upstream `links` object, stored as JSON text
    pub links: Option<String>,
    pub redirect: Option<String>,
    pub slug: Option<String>,
    pub state: Option<String>,
    pub updated_at: Option<String>,
    pub imported_at: DateTime<Utc>,
}

/// A project as it appears in a project listing file.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProject {
    #[serde(rename = "id", deserialize_with = "de::string_or_number")]
    pub external_id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub avatar_src: Option<String>,
    #[serde(default)]
    pub classifications_count: Option<i64>,
    #[serde(default)]
    pub completeness: Option<f64>,
    #[serde(default)]
    pub launch_approved: Option<bool>,
    #[serde(default)]
    pub links: Option<serde_json::Value>,
    #[serde(default)]
    pub redirect: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Project {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>("SELECT * FROM projects ORDER BY id ASC")
            .fetch_all(pool)
            .await
    }

    /// Stream every project in insertion order.
    pub fn stream_all(pool: &SqlitePool) -> BoxStream<'_, Result<Self, sqlx::Error>> {
        sqlx::query_as::<_, Project>("SELECT * FROM projects ORDER BY id ASC").fetch(pool)
    }

    pub async fn find_by_external_id(
        pool: &SqlitePool,
        external_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn exists(pool: &SqlitePool, external_id: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE external_id = $1)",
        )
        .bind(external_id)
        .fetch_one(pool)
        .await
    }

    pub async fn create(pool: &SqlitePool, data: &CreateProject) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Project>(
            r#"INSERT INTO projects (
                external_id, display_name, description, avatar_src, classifications_count,
                completeness, launch_approved, links, redirect, slug, state, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *"#,
        )
        .bind(&data.external_id)
        .bind(&data.display_name)
        .bind(&data.description)
        .bind(&data.avatar_src)
        .bind(data.classifications_count)
        .bind(data.completeness)
        .bind(data.launch_approved)
        .bind(json_text(&data.links))
        .bind(&data.redirect)
        .bind(&data.slug)
        .bind(&data.state)
        .bind(&data.updated_at)
        .fetch_one(pool)
        .await
    }

    pub async fn delete<'e, E>(executor: E, external_id: &str) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM projects WHERE external_id = $1")
            .bind(external_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}
