use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};

use super::de;

/// A tag from a project's popular tags listing.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PopularTag {
    pub id: i64,
    pub external_id: String,
    pub project_id: String,
    pub name: String,
    pub href: Option<String>,
    pub section: Option<String>,
    pub usages: Option<i64>,
    pub imported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePopularTag {
    #[serde(rename = "id", deserialize_with = "de::string_or_number")]
    pub external_id: String,
    #[serde(deserialize_with = "de::string_or_number")]
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub usages: Option<i64>,
}

impl PopularTag {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PopularTag>("SELECT * FROM popular_tags ORDER BY id ASC")
            .fetch_all(pool)
            .await
    }

    pub fn stream_all(pool: &SqlitePool) -> BoxStream<'_, Result<Self, sqlx::Error>> {
        sqlx::query_as::<_, PopularTag>("SELECT * FROM popular_tags ORDER BY id ASC").fetch(pool)
    }

    pub async fn find_by_external_id(
        pool: &SqlitePool,
        external_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PopularTag>("SELECT * FROM popular_tags WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn exists(pool: &SqlitePool, external_id: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM popular_tags WHERE external_id = $1)",
        )
        .bind(external_id)
        .fetch_one(pool)
        .await
    }

    pub async fn create(pool: &SqlitePool, data: &CreatePopularTag) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, PopularTag>(
            r#"INSERT INTO popular_tags (external_id, project_id, name, href, section, usages)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *"#,
        )
        .bind(&data.external_id)
        .bind(&data.project_id)
        .bind(&data.name)
        .bind(&data.href)
        .bind(&data.section)
        .bind(data.usages)
        .fetch_one(pool)
        .await
    }

    pub async fn count_by_project(pool: &SqlitePool, project_id: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM popular_tags WHERE project_id = $1")
            .bind(project_id)
            .fetch_one(pool)
            .await
    }

    pub async fn delete_by_project<'e, E>(executor: E, project_id: &str) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM popular_tags WHERE project_id = $1")
            .bind(project_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete<'e, E>(executor: E, external_id: &str) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM popular_tags WHERE external_id = $1")
            .bind(external_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}
