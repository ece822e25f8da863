//! Authenticated GET requests with retry, backoff and error classification.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::credentials::CredentialStore;
use crate::error::ApiError;

pub const DEFAULT_API_BASE: &str = "https://api.schwabapi.com/trader/v1";

const USER_AGENT: &str = concat!("schwab-history/", env!("CARGO_PKG_VERSION"));

/// Issues GET requests against the brokerage API and returns parsed JSON.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ApiError>;
}

/// Bounded exponential backoff for 429/5xx/network failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Shared "do not send before" instant.
///
/// A 429 seen by any request pushes the instant forward so every concurrent
/// request waits it out instead of piling onto the rate limit.
#[derive(Debug, Default)]
pub struct RateGate {
    not_before: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn wait(&self) {
        let not_before = *self.not_before.lock().await;
        if let Some(at) = not_before {
            tokio::time::sleep_until(at).await;
        }
    }

    pub async fn block_for(&self, delay: Duration) {
        let until = Instant::now() + delay;
        let mut guard = self.not_before.lock().await;
        if guard.map_or(true, |current| current < until) {
            *guard = Some(until);
        }
    }
}

/// reqwest-backed [`Transport`] that attaches a bearer token from the
/// [`CredentialStore`].
pub struct HttpTransport {
    client: Client,
    base_url: String,
    credentials: Arc<CredentialStore>,
    retry: RetryPolicy,
    gate: RateGate,
}

impl HttpTransport {
    pub fn new(client: Client, credentials: Arc<CredentialStore>) -> Self {
        Self {
            client,
            base_url: DEFAULT_API_BASE.to_string(),
            credentials,
            retry: RetryPolicy::default(),
            gate: RateGate::new(),
        }
    }

    /// Build the HTTP client used for API and token requests.
    pub fn build_client(timeout: Duration) -> Result<Client, ApiError> {
        Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Config(format!("failed to create HTTP client: {e}")))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn send(
        &self,
        url: &str,
        query: &[(&str, String)],
        token: &SecretString,
    ) -> reqwest::Result<reqwest::Response> {
        self.client
            .get(url)
            .query(query)
            .bearer_auth(token.expose_secret())
            .header("Accept", "application/json")
            .header("Schwab-Client-CorrelId", uuid::Uuid::new_v4().to_string())
            .send()
            .await
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        // Token handed back by a forced refresh, used for the very next send only.
        let mut pending_token: Option<SecretString> = None;
        let mut refreshed = false;
        let mut attempt = 0u32;

        loop {
            let token = match pending_token.take() {
                Some(token) => token,
                None => self.credentials.get_valid_token().await?,
            };

            attempt += 1;
            self.gate.wait().await;

            let response = match self.send(&url, query, &token).await {
                Ok(response) => response,
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(ApiError::Transient {
                            attempts: attempt,
                            reason: format!("{path}: {e}"),
                        });
                    }
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(path, attempt, error = %e, delay_ms = delay.as_millis() as u64, "Request failed, retrying");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                if refreshed {
                    return Err(ApiError::Auth(format!(
                        "{path} rejected a freshly refreshed token (401)"
                    )));
                }
                refreshed = true;
                pending_token = Some(self.credentials.force_refresh(&token).await?);
                // The auth retry does not count against the backoff budget.
                attempt -= 1;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if attempt >= self.retry.max_attempts {
                    return Err(ApiError::Transient {
                        attempts: attempt,
                        reason: format!("{path}: HTTP {status}"),
                    });
                }
                let delay = retry_after(&response)
                    .unwrap_or_else(|| self.retry.delay_for(attempt))
                    .min(self.retry.max_delay);
                tracing::warn!(path, attempt, %status, delay_ms = delay.as_millis() as u64, "Retryable response, backing off");
                if status == StatusCode::TOO_MANY_REQUESTS {
                    self.gate.block_for(delay).await;
                } else {
                    tokio::time::sleep(delay).await;
                }
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ApiError::ClientRequest {
                    status: status.as_u16(),
                    body,
                });
            }

            let body = response.text().await.map_err(|e| ApiError::Decode {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
            tracing::debug!(path, bytes = body.len(), "Response received");
            return serde_json::from_str(&body).map_err(|e| ApiError::Decode {
                path: path.to_string(),
                reason: format!("{e} (body: {})", body.chars().take(200).collect::<String>()),
            });
        }
    }
}
