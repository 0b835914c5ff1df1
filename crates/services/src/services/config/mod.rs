use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Backoff settings for upstream requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fraction of the computed delay added as random jitter (0.0 - 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 300,
            base_delay_ms: 100,
            max_delay_ms: 60_000,
            jitter_factor: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSizes {
    pub boards: u32,
    pub discussions: u32,
    pub comments: u32,
    pub tags: u32,
}

impl Default for PageSizes {
    fn default() -> Self {
        Self {
            boards: 20,
            discussions: 50,
            comments: 50,
            tags: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImporterConfig {
    pub api_base_url: String,
    /// Minimum spacing between outbound requests
    pub request_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
    pub page_sizes: PageSizes,
    /// Pages of popular tags fetched per project; `None` walks every page
    pub tag_page_limit: Option<u32>,
    /// Directory holding the `{"projects": [...]}` listing files
    pub projects_dir: String,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://talk.zooniverse.org".to_string(),
            request_interval_ms: 50,
            request_timeout_secs: 30,
            retry: RetryConfig::default(),
            page_sizes: PageSizes::default(),
            tag_page_limit: Some(1),
            projects_dir: "projects-data".to_string(),
        }
    }
}

impl ImporterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "api_base_url must not be empty".to_string(),
            ));
        }
        let sizes = &self.page_sizes;
        if [sizes.boards, sizes.discussions, sizes.comments, sizes.tags].contains(&0) {
            return Err(ConfigError::ValidationError(
                "page sizes must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(ConfigError::ValidationError(format!(
                "jitter_factor must be between 0 and 1, got {}",
                self.retry.jitter_factor
            )));
        }
        if self.tag_page_limit == Some(0) {
            return Err(ConfigError::ValidationError(
                "tag_page_limit must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load the importer configuration.
///
/// A missing file yields the defaults; an unreadable or malformed one is an
/// error so a typo never silently falls back to hammering the default host.
pub fn load_config_from_file(config_path: &Path) -> Result<ImporterConfig, ConfigError> {
    let raw_config = match std::fs::read_to_string(config_path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %config_path.display(), "No config file found, using defaults");
            return Ok(ImporterConfig::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: ImporterConfig = serde_json::from_str(&raw_config)?;
    config.validate()?;
    Ok(config)
}

/// Saves the config to the given path
pub fn save_config_to_file(config: &ImporterConfig, config_path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let raw_config = serde_json::to_string_pretty(config)?;
    std::fs::write(config_path, raw_config)?;
    Ok(())
}
