//! Command line interface of `talk-importer`.

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use db::{DBService, get_database_stats};
use services::services::{
    config::{ImporterConfig, load_config_from_file},
    export::export_all,
    importer::{ImportStats, Importer},
    project_seed::seed_projects,
    talk_client::TalkClient,
};
use tracing::{info, warn};
use utils::assets::{config_path, database_path, export_dir};

#[derive(Debug, Parser)]
#[command(name = "talk-importer")]
#[command(about = "Import Zooniverse Talk boards, discussions and comments into SQLite")]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to `{config_dir}/config.json`)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database file (defaults to `{data_dir}/talk.sqlite`)
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Seed projects from local listing files
    Projects {
        /// Directory holding `*.json` project pages
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Import the boards of every project
    Boards,
    /// Import the discussions of every board
    Discussions,
    /// Import the comments of every discussion
    Comments,
    /// Import the popular tags of every project
    Tags,
    /// Seed projects, then import boards, discussions, comments and tags
    All {
        /// Directory holding `*.json` project pages
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Write every table to CSV
    Export {
        /// Output directory (defaults to `{data_dir}/exports`)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Show row and checkpoint counts
    Status,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(config_path)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(database_path)
    }
}

pub fn load_config(path: &Path) -> anyhow::Result<ImporterConfig> {
    load_config_from_file(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Execute the parsed command. The exit code is non-zero when any parent
/// failed to import; the next run resumes from its checkpoints.
pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(&cli.config_path())?;
    let db_path = cli.database_path();
    let db = DBService::connect(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    info!(database = %db_path.display(), "Opened database");

    let pool = db.pool.clone();
    let result = match cli.command {
        Command::Projects { dir } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from(&config.projects_dir));
            let stats = seed_projects(&pool, &dir).await?;
            if stats.files_failed > 0 || stats.failed > 0 {
                warn!(
                    files_failed = stats.files_failed,
                    failed = stats.failed,
                    "Some projects could not be imported"
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Boards => {
            let stats = importer(&db, config).await?.import_boards().await?;
            Ok(exit_code(&stats))
        }
        Command::Discussions => {
            let stats = importer(&db, config).await?.import_discussions().await?;
            Ok(exit_code(&stats))
        }
        Command::Comments => {
            let stats = importer(&db, config).await?.import_comments().await?;
            Ok(exit_code(&stats))
        }
        Command::Tags => {
            let stats = importer(&db, config).await?.import_popular_tags().await?;
            Ok(exit_code(&stats))
        }
        Command::All { dir } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from(&config.projects_dir));
            let summary = importer(&db, config).await?.run_all(&dir).await?;
            let total = summary.total();
            info!(
                projects = summary.projects.inserted,
                inserted = total.inserted,
                parents_failed = total.parents_failed,
                parents_deleted = total.parents_deleted,
                "Import finished"
            );
            Ok(exit_code(&total))
        }
        Command::Export { dir } => {
            let dir = dir.unwrap_or_else(export_dir);
            let exports = export_all(&pool, &dir).await?;
            for export in &exports {
                match export.rows {
                    Some(rows) => println!("{}: {} rows", export.path.display(), rows),
                    None => println!("{}: already exists, skipped", export.path.display()),
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Status => {
            let stats = get_database_stats(&pool).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(ExitCode::SUCCESS)
        }
    };

    pool.close().await;
    result
}

async fn importer(db: &DBService, config: ImporterConfig) -> anyhow::Result<Importer<TalkClient>> {
    Ok(Importer::from_config(db.pool.clone(), config).await?)
}

fn exit_code(stats: &ImportStats) -> ExitCode {
    if stats.has_failures() {
        warn!(
            parents_failed = stats.parents_failed,
            "Some parents failed to import; rerun to resume from checkpoints"
        );
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_flags_after_command() {
        let cli = Cli::try_parse_from([
            "talk-importer",
            "comments",
            "--database",
            "/tmp/talk.sqlite",
        ])
        .unwrap();
        assert_eq!(cli.command, Command::Comments);
        assert_eq!(cli.database_path(), PathBuf::from("/tmp/talk.sqlite"));
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_directory_options() {
        let cli = Cli::try_parse_from(["talk-importer", "all", "--dir", "seed"]).unwrap();
        assert_eq!(
            cli.command,
            Command::All {
                dir: Some(PathBuf::from("seed"))
            }
        );

        let cli = Cli::try_parse_from(["talk-importer", "-c", "cfg.json", "export"]).unwrap();
        assert_eq!(cli.command, Command::Export { dir: None });
        assert_eq!(cli.config_path(), PathBuf::from("cfg.json"));
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["talk-importer", "crawl"]).is_err());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"page_sizes": {"comments": 0}}"#).unwrap();
        assert!(load_config(&path).is_err());

        let missing = load_config(&dir.path().join("absent.json")).unwrap();
        assert_eq!(missing, ImporterConfig::default());
    }

    #[tokio::test]
    async fn test_status_and_export_on_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        let database = dir.path().join("talk.sqlite");
        let exports = dir.path().join("out");

        for command in [
            Command::Status,
            Command::Export {
                dir: Some(exports.clone()),
            },
        ] {
            let code = run(Cli {
                config: Some(dir.path().join("config.json")),
                database: Some(database.clone()),
                command,
            })
            .await
            .unwrap();
            assert_eq!(code, ExitCode::SUCCESS);
        }
        assert!(exports.join("comments.csv").exists());
    }
}
