//! Exponential backoff for listing requests.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use thiserror::Error;

use super::{config::RetryConfig, talk_client::TalkClientError};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{operation}: gave up after {attempts} attempts: {last}")]
    Exhausted {
        operation: String,
        attempts: u32,
        #[source]
        last: TalkClientError,
    },
    #[error("{operation}: {source}")]
    Permanent {
        operation: String,
        #[source]
        source: TalkClientError,
    },
}

/// Details of a failed attempt that is about to be retried.
#[derive(Debug, Clone)]
pub struct RetryEvent<'a> {
    pub operation: &'a str,
    /// 1-based number of the attempt that failed
    pub attempt: u32,
    pub delay: Duration,
    pub error: &'a TalkClientError,
}

pub type RetryObserver = Arc<dyn Fn(&RetryEvent<'_>) + Send + Sync>;

#[derive(Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
    observer: Option<RetryObserver>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("jitter_factor", &self.jitter_factor)
            .field("observer", &self.observer.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter_factor: config.jitter_factor,
            observer: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            jitter_factor: 0.0,
            observer: None,
        }
    }

    /// Call `observer` before every retry sleep.
    pub fn with_observer(mut self, observer: RetryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Delay before retrying after the failure of attempt number `attempt`
    /// (0-based): `base * 2^attempt`, capped at `max_delay`, plus jitter.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let capped_delay = base_ms.saturating_mul(factor).min(max_ms);

        let jitter = if self.jitter_factor > 0.0 {
            let jitter_range = (capped_delay as f64 * self.jitter_factor) as u64;
            if jitter_range > 0 {
                // Simple pseudo-random jitter using current time
                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .subsec_nanos() as u64;
                now % jitter_range
            } else {
                0
            }
        } else {
            0
        };

        Duration::from_millis(capped_delay + jitter)
    }

    /// Run `request` until it succeeds, fails permanently or retries run out.
    pub async fn execute<F, Fut, T>(&self, operation: &str, mut request: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TalkClientError>>,
    {
        let mut attempt = 0;

        loop {
            match request().await {
                Ok(result) => {
                    if attempt > 0 {
                        tracing::debug!(
                            operation,
                            attempts = attempt + 1,
                            "Request succeeded after retry"
                        );
                    }
                    return Ok(result);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let mut delay = self.calculate_delay(attempt);
                    if let TalkClientError::RateLimited {
                        retry_after: Some(retry_after),
                    } = &e
                    {
                        delay = delay.max(*retry_after);
                    }

                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient request failure, retrying with backoff"
                    );
                    if let Some(observer) = &self.observer {
                        observer(&RetryEvent {
                            operation,
                            attempt: attempt + 1,
                            delay,
                            error: &e,
                        });
                    }

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    tracing::error!(
                        operation,
                        attempts = attempt + 1,
                        error = %e,
                        "Request failed after all retries"
                    );
                    return Err(FetchError::Exhausted {
                        operation: operation.to_string(),
                        attempts: attempt + 1,
                        last: e,
                    });
                }
                Err(e) => {
                    return Err(FetchError::Permanent {
                        operation: operation.to_string(),
                        source: e,
                    });
                }
            }
        }
    }
}
