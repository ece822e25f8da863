//! Credential lifecycle: the cached token pair and how it gets refreshed.
//!
//! [`CredentialStore`] owns a single lock-guarded [`Credentials`] cell.
//! Every request asks it for a token; when the cached access token is
//! within the safety margin of expiry the store calls its
//! [`TokenRefresher`] while holding the lock, so concurrent callers wait
//! for that one refresh instead of starting their own.

mod oauth;
mod store;
mod token_file;

pub use oauth::{OAuthRefresher, DEFAULT_TOKEN_URL};
pub use store::CredentialStore;
pub use token_file::TokenFile;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};

use crate::error::ApiError;

/// An access/refresh token pair. Replaced wholesale on every refresh.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub expires_at: DateTime<Utc>,
}

impl Credentials {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: SecretString::from(refresh_token.into()),
            expires_at,
        }
    }

    /// True when the access token stays valid for at least `margin` past `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at - margin > now
    }

    pub(crate) fn same_access_token(&self, other: &SecretString) -> bool {
        self.access_token.expose_secret() == other.expose_secret()
    }
}

/// Exchanges a refresh token for a new credential pair.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Returns `ApiError::Auth` when the refresh token is rejected; callers
    /// must not retry, since that needs re-authorization out of band.
    async fn refresh(&self, refresh_token: &SecretString) -> Result<Credentials, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn freshness_respects_margin() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let creds = Credentials::new("a", "r", now + Duration::seconds(90));
        assert!(creds.is_fresh(now, Duration::seconds(60)));
        assert!(!creds.is_fresh(now, Duration::seconds(90)));
        assert!(!creds.is_fresh(now + Duration::seconds(31), Duration::seconds(60)));
    }
}
