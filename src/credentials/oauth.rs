use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Duration;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{Credentials, TokenRefresher};
use crate::clock::{Clock, SystemClock};
use crate::error::ApiError;

pub const DEFAULT_TOKEN_URL: &str = "https://api.schwabapi.com/v1/oauth/token";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Only present when the server rotates the refresh token.
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Refreshes tokens with the OAuth `refresh_token` grant, authenticating
/// the app with HTTP Basic client credentials.
pub struct OAuthRefresher {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    clock: Arc<dyn Clock>,
}

impl OAuthRefresher {
    pub fn new(client: Client, client_id: impl Into<String>, client_secret: SecretString) -> Self {
        Self {
            client,
            token_url: DEFAULT_TOKEN_URL.to_string(),
            client_id: client_id.into(),
            client_secret,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn basic_auth_header(&self) -> String {
        let pair = format!("{}:{}", self.client_id, self.client_secret.expose_secret());
        format!("Basic {}", STANDARD.encode(pair))
    }
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    async fn refresh(&self, refresh_token: &SecretString) -> Result<Credentials, ApiError> {
        let issued_at = self.clock.now();
        let response = self
            .client
            .post(&self.token_url)
            .header("Authorization", self.basic_auth_header())
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose_secret()),
            ])
            .send()
            .await
            .map_err(|e| ApiError::Auth(format!("token refresh request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Auth(format!("failed to read token response: {e}")))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<TokenErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error_description.or(e.error))
                .unwrap_or(body);
            return Err(ApiError::Auth(format!(
                "token refresh failed ({status}): {detail}; re-authorize the app"
            )));
        }

        let tokens: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::Auth(format!("token response invalid: {e}")))?;

        let refresh_token = tokens
            .refresh_token
            .unwrap_or_else(|| refresh_token.expose_secret().to_string());

        let expires_at = Duration::try_seconds(tokens.expires_in)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| {
                ApiError::Auth(format!(
                    "token response has invalid expires_in ({})",
                    tokens.expires_in
                ))
            })?;

        Ok(Credentials::new(tokens.access_token, refresh_token, expires_at))
    }
}
