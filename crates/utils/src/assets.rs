use std::path::PathBuf;

use directories::ProjectDirs;

const PROJECT_ROOT: &str = env!("CARGO_MANIFEST_DIR");

/// Root directory for everything the importer keeps on disk.
///
/// Respects the `TALK_DATA_DIR` environment variable. Debug builds default to
/// `dev_assets/` at the workspace root so local runs never touch the real store.
pub fn data_dir() -> PathBuf {
    if let Ok(path) = std::env::var("TALK_DATA_DIR") {
        return crate::path::expand_tilde(&path);
    }

    if cfg!(debug_assertions) {
        PathBuf::from(PROJECT_ROOT).join("../../dev_assets")
    } else {
        ProjectDirs::from("org", "zooniverse", "talk-importer")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".talk-importer"))
    }
    // ✔ macOS → ~/Library/Application Support/org.zooniverse.talk-importer
    // ✔ Linux → ~/.local/share/talk-importer   (respects XDG_DATA_HOME)
    // ✔ Windows → %APPDATA%\zooniverse\talk-importer
}

/// Get the configuration directory path.
///
/// Respects the `TALK_CONFIG_DIR` environment variable for custom locations.
/// Supports tilde expansion (e.g., `~/talk/config`).
///
/// Default: `{data_dir}`
pub fn config_dir() -> PathBuf {
    if let Ok(path) = std::env::var("TALK_CONFIG_DIR") {
        return crate::path::expand_tilde(&path);
    }
    data_dir()
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Get the database file path.
///
/// Respects the `TALK_DATABASE_PATH` environment variable for custom locations.
///
/// Default: `{data_dir}/talk.sqlite`
pub fn database_path() -> PathBuf {
    if let Ok(path) = std::env::var("TALK_DATABASE_PATH") {
        return crate::path::expand_tilde(&path);
    }
    data_dir().join("talk.sqlite")
}

/// Directory the CSV export stage writes into.
///
/// Respects the `TALK_EXPORT_DIR` environment variable.
///
/// Default: `{data_dir}/exports`
pub fn export_dir() -> PathBuf {
    if let Ok(path) = std::env::var("TALK_EXPORT_DIR") {
        return crate::path::expand_tilde(&path);
    }
    data_dir().join("exports")
}

/// Directory for rotated log files.
pub fn log_dir() -> PathBuf {
    if let Ok(path) = std::env::var("TALK_LOG_DIR") {
        return crate::path::expand_tilde(&path);
    }
    data_dir().join("logs")
}
