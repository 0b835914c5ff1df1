use std::process::ExitCode;

use clap::Parser;
use importer::{cli::Cli, file_logging};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (for development)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // The guard must outlive the run so buffered file logs are flushed
    let log_level = std::env::var("TALK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let _file_log_guard = file_logging::init_logging(&log_level);

    match importer::cli::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
