//! Shared plumbing for the collaborator clients: client construction,
//! URL joining, status checking and retries for idempotent lookups.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::domain::models::HttpClientConfig;
use crate::domain::ports::ClientError;

/// Exponential backoff for transient failures.
///
/// Backoff doubles with each retry and is capped at `max_backoff_ms`. Only
/// errors for which [`ClientError::is_transient`] holds are retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff_ms,
            max_backoff_ms: max_backoff_ms.max(initial_backoff_ms),
        }
    }

    pub fn from_config(config: &HttpClientConfig) -> Self {
        Self::new(
            config.max_retries,
            config.initial_backoff_ms,
            config.max_backoff_ms,
        )
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt, "request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    warn!(attempt = attempt + 1, ?delay, error = %err, "transient error, retrying");
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&HttpClientConfig::default())
    }
}

/// Build the reqwest client shared by all collaborator clients.
pub fn build_client(config: &HttpClientConfig) -> Result<Client, ClientError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(concat!("curator/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Join `path` onto `base`; an absolute `path` is used verbatim.
pub fn endpoint(base: &str, path: &str) -> Result<Url, ClientError> {
    if path.starts_with("http://") || path.starts_with("https://") {
        return Ok(Url::parse(path)?);
    }
    Ok(Url::parse(&format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    ))?)
}

/// Turn non-success responses into errors, keeping the body for diagnostics.
pub async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        Err(ClientError::NotFound(url))
    } else {
        Err(ClientError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
