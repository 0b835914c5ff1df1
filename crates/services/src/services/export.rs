//! CSV export of the imported tables.
//!
//! Every table goes to its own file in the export directory. A file that
//! already exists is left alone, so deleting one file and rerunning the
//! export regenerates just that table. Rows are streamed from SQLite and
//! written to a `.partial` file that is renamed into place once complete.

use std::path::{Path, PathBuf};

use db::models::{
    board::Board, comment::Comment, discussion::Discussion, popular_tag::PopularTag,
    project::Project,
};
use futures_util::{Stream, TryStreamExt};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

use super::upsert_sink::strip_newlines_opt;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableExport {
    pub path: PathBuf,
    /// Rows written, or `None` when the file already existed
    pub rows: Option<u64>,
}

impl TableExport {
    pub fn skipped(&self) -> bool {
        self.rows.is_none()
    }
}

pub const PROJECTS_FILE: &str = "projects.csv";
pub const BOARDS_FILE: &str = "boards.csv";
pub const DISCUSSIONS_FILE: &str = "discussions.csv";
pub const COMMENTS_FILE: &str = "comments.csv";
pub const POPULAR_TAGS_FILE: &str = "popularTags.csv";

/// Export every table into `dir`, creating it if needed.
pub async fn export_all(pool: &SqlitePool, dir: &Path) -> Result<Vec<TableExport>, ExportError> {
    tokio::fs::create_dir_all(dir).await?;

    let exports = vec![
        export_table(
            pool,
            dir,
            PROJECTS_FILE,
            "projects",
            Project::stream_all(pool),
            |project: &mut Project| {
                project.description = strip_newlines_opt(&project.description);
            },
        )
        .await?,
        export_table(
            pool,
            dir,
            BOARDS_FILE,
            "boards",
            Board::stream_all(pool),
            |board: &mut Board| {
                board.description = strip_newlines_opt(&board.description);
            },
        )
        .await?,
        export_table(
            pool,
            dir,
            DISCUSSIONS_FILE,
            "discussions",
            Discussion::stream_all(pool),
            |discussion: &mut Discussion| {
                discussion.board_description = strip_newlines_opt(&discussion.board_description);
            },
        )
        .await?,
        export_table(
            pool,
            dir,
            COMMENTS_FILE,
            "comments",
            Comment::stream_all(pool),
            |comment: &mut Comment| {
                comment.body = strip_newlines_opt(&comment.body);
                comment.board_description = strip_newlines_opt(&comment.board_description);
            },
        )
        .await?,
        export_table(
            pool,
            dir,
            POPULAR_TAGS_FILE,
            "popular_tags",
            PopularTag::stream_all(pool),
            |_: &mut PopularTag| {},
        )
        .await?,
    ];

    Ok(exports)
}

async fn export_table<T, S, C>(
    pool: &SqlitePool,
    dir: &Path,
    file_name: &str,
    table: &str,
    mut rows: S,
    mut clean: C,
) -> Result<TableExport, ExportError>
where
    T: Serialize,
    S: Stream<Item = Result<T, sqlx::Error>> + Unpin,
    C: FnMut(&mut T),
{
    let path = dir.join(file_name);
    if tokio::fs::try_exists(&path).await? {
        info!(file = %path.display(), "Export file already exists, skipping");
        return Ok(TableExport { path, rows: None });
    }

    info!(file = %path.display(), "Writing export");
    let partial = path.with_extension("csv.partial");
    // Rows go through the writer's buffer; the file is only touched when it fills.
    let mut writer = csv::Writer::from_path(&partial)?;
    let mut written = 0u64;

    while let Some(mut row) = rows.try_next().await? {
        clean(&mut row);
        writer.serialize(&row)?;
        written += 1;
    }

    // Rows carry the header; an empty table needs it written by hand.
    if written == 0 {
        let columns = table_columns(pool, table).await?;
        writer.write_record(&columns)?;
    }

    writer.flush()?;
    drop(writer);
    tokio::fs::rename(&partial, &path).await?;

    info!(file = %path.display(), rows = written, "Finished export");
    Ok(TableExport {
        path,
        rows: Some(written),
    })
}

async fn table_columns(pool: &SqlitePool, table: &str) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT name FROM pragma_table_info($1) ORDER BY cid")
        .bind(table)
        .fetch_all(pool)
        .await
}

#[cfg(test)]
mod tests {
    use db::{
        models::{board::CreateBoard, comment::CreateComment, project::CreateProject},
        test_utils::create_test_pool,
    };
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    async fn seed(pool: &SqlitePool) {
        let project: CreateProject = serde_json::from_value(json!({
            "id": "1",
            "display_name": "Galaxy Zoo",
            "links": {"org": ["a", "b"]},
        }))
        .unwrap();
        Project::create(pool, &project).await.unwrap();

        let board: CreateBoard = serde_json::from_value(json!({
            "id": "10",
            "project_id": "1",
            "title": "Chat",
            "description": "first\nsecond",
        }))
        .unwrap();
        Board::create(pool, &board).await.unwrap();

        let comment: CreateComment = serde_json::from_value(json!({
            "id": "100",
            "discussion_id": "50",
            "body": "hello\r\nthere, \"friend\"",
        }))
        .unwrap();
        Comment::create(pool, &comment).await.unwrap();
    }

    fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
        let mut reader = csv::Reader::from_path(path).unwrap();
        let headers = reader.headers().unwrap().iter().map(String::from).collect();
        let rows = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        (headers, rows)
    }

    fn column<'a>(headers: &[String], row: &'a [String], name: &str) -> &'a str {
        let index = headers.iter().position(|h| h == name).unwrap();
        &row[index]
    }

    #[tokio::test]
    async fn test_export_writes_every_table() {
        let (pool, _db) = create_test_pool().await;
        seed(&pool).await;
        let dir = TempDir::new().unwrap();

        let exports = export_all(&pool, dir.path()).await.unwrap();
        let names: Vec<_> = exports
            .iter()
            .map(|e| e.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![PROJECTS_FILE, BOARDS_FILE, DISCUSSIONS_FILE, COMMENTS_FILE, POPULAR_TAGS_FILE]
        );
        assert_eq!(
            exports.iter().map(|e| e.rows).collect::<Vec<_>>(),
            vec![Some(1), Some(1), Some(0), Some(1), Some(0)]
        );

        let (headers, rows) = read_csv(&dir.path().join(BOARDS_FILE));
        assert_eq!(column(&headers, &rows[0], "description"), "firstsecond");

        let (headers, rows) = read_csv(&dir.path().join(COMMENTS_FILE));
        assert_eq!(column(&headers, &rows[0], "body"), "hellothere, \"friend\"");

        let (headers, rows) = read_csv(&dir.path().join(PROJECTS_FILE));
        assert_eq!(column(&headers, &rows[0], "links"), r#"{"org":["a","b"]}"#);

        // Empty tables still get a header row.
        let (headers, rows) = read_csv(&dir.path().join(POPULAR_TAGS_FILE));
        assert!(headers.iter().any(|h| h == "external_id"));
        assert!(rows.is_empty());
        assert!(!dir.path().join("popularTags.csv.partial").exists());
    }

    #[tokio::test]
    async fn test_export_creates_missing_directory() {
        let (pool, _db) = create_test_pool().await;
        let root = TempDir::new().unwrap();
        let dir = root.path().join("exports").join("latest");

        let exports = export_all(&pool, &dir).await.unwrap();

        assert!(exports.iter().all(|e| e.rows == Some(0)));
        let mut files: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(
            files,
            vec![BOARDS_FILE, COMMENTS_FILE, DISCUSSIONS_FILE, POPULAR_TAGS_FILE, PROJECTS_FILE]
        );
    }

    #[tokio::test]
    async fn test_existing_files_are_skipped() {
        let (pool, _db) = create_test_pool().await;
        seed(&pool).await;
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(BOARDS_FILE), "keep me").unwrap();

        let exports = export_all(&pool, dir.path()).await.unwrap();

        assert!(exports[1].skipped());
        assert!(!exports[0].skipped());
        assert_eq!(
            std::fs::read_to_string(dir.path().join(BOARDS_FILE)).unwrap(),
            "keep me"
        );
    }
}
