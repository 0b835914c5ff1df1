//! Seeds the projects table from local listing files.
//!
//! Projects are not walked over the API; they come from JSON files shaped
//! like one page of the projects listing (`{"projects": [...]}`). Files are
//! read in file name order so `page1.json`, `page2.json`, ... import in
//! sequence.

use std::path::{Path, PathBuf};

use db::models::project::{CreateProject, Project};
use serde::Deserialize;
use serde_json::Value;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::upsert_sink::{UpsertOutcome, strip_newlines_opt};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Failed to read projects directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedStats {
    pub files: usize,
    /// Files that could not be read or parsed
    pub files_failed: usize,
    pub inserted: u64,
    pub already_present: u64,
    pub failed: u64,
}

#[derive(Deserialize)]
struct ProjectsFile {
    projects: Vec<Value>,
}

/// List the `*.json` files in `dir`, sorted by file name.
pub fn project_files(dir: &Path) -> Result<Vec<PathBuf>, SeedError> {
    let entries = std::fs::read_dir(dir).map_err(|source| SeedError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Insert every project found in `dir` that is not stored yet.
///
/// A file that cannot be parsed, or a project that cannot be stored, is
/// logged and skipped. Only a missing directory or a failing existence check
/// stops the seed.
pub async fn seed_projects(pool: &SqlitePool, dir: &Path) -> Result<SeedStats, SeedError> {
    let files = project_files(dir)?;
    let mut stats = SeedStats {
        files: files.len(),
        ..Default::default()
    };

    if files.is_empty() {
        warn!(dir = %dir.display(), "No project files found");
        return Ok(stats);
    }

    for (index, path) in files.iter().enumerate() {
        info!(
            index = index + 1,
            total = files.len(),
            file = %path.display(),
            "Importing projects file ({} of {})",
            index + 1,
            files.len()
        );

        let projects = match read_projects_file(path).await {
            Ok(projects) => projects,
            Err(e) => {
                stats.files_failed += 1;
                error!(file = %path.display(), error = %e, "Skipping unreadable projects file");
                continue;
            }
        };

        for value in projects {
            let project: CreateProject = match serde_json::from_value(value) {
                Ok(project) => project,
                Err(e) => {
                    stats.failed += 1;
                    warn!(file = %path.display(), error = %e, "Invalid project entry");
                    continue;
                }
            };

            match insert_project(pool, project).await {
                Ok(UpsertOutcome::Inserted) => stats.inserted += 1,
                Ok(UpsertOutcome::AlreadyExists) => stats.already_present += 1,
                Err(InsertFailure::Lookup(e)) => return Err(e.into()),
                Err(InsertFailure::Insert { name, source }) => {
                    stats.failed += 1;
                    error!(project = %name, error = %source, "Failed to import project");
                }
            }
        }
    }

    info!(
        inserted = stats.inserted,
        already_present = stats.already_present,
        failed = stats.failed,
        files_failed = stats.files_failed,
        "Finished seeding projects"
    );
    Ok(stats)
}

async fn read_projects_file(path: &Path) -> Result<Vec<Value>, Box<dyn std::error::Error + Send + Sync>> {
    let raw = tokio::fs::read_to_string(path).await?;
    let file: ProjectsFile = serde_json::from_str(&raw)?;
    Ok(file.projects)
}

enum InsertFailure {
    Lookup(sqlx::Error),
    Insert { name: String, source: sqlx::Error },
}

async fn insert_project(
    pool: &SqlitePool,
    mut project: CreateProject,
) -> Result<UpsertOutcome, InsertFailure> {
    if Project::exists(pool, &project.external_id)
        .await
        .map_err(InsertFailure::Lookup)?
    {
        debug!(project = %project.display_name, "Project already exists");
        return Ok(UpsertOutcome::AlreadyExists);
    }

    project.description = strip_newlines_opt(&project.description);
    match Project::create(pool, &project).await {
        Ok(_) => {
            debug!(project = %project.display_name, "Imported project");
            Ok(UpsertOutcome::Inserted)
        }
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Ok(UpsertOutcome::AlreadyExists)
        }
        Err(source) => Err(InsertFailure::Insert {
            name: project.display_name,
            source,
        }),
    }
}
