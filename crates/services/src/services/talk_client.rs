//! HTTP client for the Talk listing API.

use std::time::Duration;

use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use serde_json::Value;
use thiserror::Error;

use super::{
    config::ImporterConfig,
    pagination::{Page, PageEnvelope, PageKey},
};

/// Errors that can occur when requesting a listing page.
#[derive(Debug, Clone, Error)]
pub enum TalkClientError {
    #[error("Request timed out")]
    Timeout,
    #[error("Could not connect to the API: {0}")]
    Connect(String),
    #[error("Request failed: {0}")]
    Transport(String),
    #[error("Rate limited by the API")]
    RateLimited { retry_after: Option<Duration> },
    #[error("API returned error: HTTP {status} - {body}")]
    Http { status: u16, body: String },
    #[error("Failed to parse API response: {0}")]
    Parse(String),
}

impl TalkClientError {
    /// Returns true if the error is transient and could be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect(_) | Self::Transport(_) | Self::RateLimited { .. } => {
                true
            }
            Self::Http { status, .. } => *status >= 500 || *status == 408,
            Self::Parse(_) => false,
        }
    }
}

#[derive(Clone)]
pub struct TalkClient {
    http: Client,
    base_url: String,
}

impl std::fmt::Debug for TalkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TalkClient")
            .field("http", &"<reqwest::Client>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl TalkClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TalkClientError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("talk-importer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TalkClientError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ImporterConfig) -> Result<Self, TalkClientError> {
        Self::new(
            config.api_base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Absolute URL of a page.
    pub fn url_for(&self, key: &PageKey) -> String {
        format!("{}/{}", self.base_url, key.cache_key())
    }

    /// GET one listing page as raw JSON.
    pub async fn get_json(&self, key: &PageKey) -> Result<Value, TalkClientError> {
        let url = self.url_for(key);
        tracing::debug!(url = %url, "Requesting listing page");

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_reqwest_error)?;

        handle_response(response).await
    }

    /// GET one listing page and split it into items and envelope.
    pub async fn get_page(&self, key: &PageKey) -> Result<Page, TalkClientError> {
        let body = self.get_json(key).await?;
        parse_page(key.collection, body)
    }
}

async fn handle_response(response: reqwest::Response) -> Result<Value, TalkClientError> {
    let status = response.status();

    if status.is_success() {
        return response.json::<Value>().await.map_err(|e| {
            if e.is_decode() {
                TalkClientError::Parse(e.to_string())
            } else {
                map_reqwest_error(e)
            }
        });
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, body, retry_after))
}

fn classify_status(
    status: StatusCode,
    body: String,
    retry_after: Option<Duration>,
) -> TalkClientError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        TalkClientError::RateLimited { retry_after }
    } else {
        TalkClientError::Http {
            status: status.as_u16(),
            body,
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TalkClientError {
    if e.is_timeout() {
        TalkClientError::Timeout
    } else if e.is_connect() {
        TalkClientError::Connect(e.to_string())
    } else {
        TalkClientError::Transport(e.to_string())
    }
}

/// Split a listing response into its `collection` items and envelope.
///
/// Responses look like
/// `{"<collection>": [...], "meta": {"<collection>": {"count": .., ..}}}`.
pub fn parse_page(collection: &str, mut body: Value) -> Result<Page, TalkClientError> {
    let meta = body
        .get_mut("meta")
        .and_then(|meta| meta.get_mut(collection))
        .map(Value::take)
        .ok_or_else(|| {
            TalkClientError::Parse(format!("response has no meta.{collection} envelope"))
        })?;
    let meta: PageEnvelope = serde_json::from_value(meta).map_err(|e| {
        TalkClientError::Parse(format!("invalid meta.{collection} envelope: {e}"))
    })?;

    let items = match body.get_mut(collection).map(Value::take) {
        Some(Value::Array(items)) => items,
        // An empty listing may omit the collection entirely
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            return Err(TalkClientError::Parse(format!(
                "expected `{collection}` to be an array, got {other}"
            )));
        }
    };

    Ok(Page { items, meta })
}
