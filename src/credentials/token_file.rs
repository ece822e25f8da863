//! On-disk token pair, in the JSON shape the OAuth token endpoint returns.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::Credentials;

#[derive(Debug, Serialize, Deserialize)]
struct TokenFileContents {
    access_token: String,
    refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_in: Option<i64>,
    /// Absolute expiry. Files written by other tools may only carry
    /// `expires_in`, which is meaningless without the time it was issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

/// A `token.json` file holding the current access and refresh tokens.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored token pair.
    ///
    /// Without an `expires_at` field the access token is treated as already
    /// expired, so the first request refreshes it.
    pub fn load(&self, now: DateTime<Utc>) -> Result<Credentials> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read token file: {}", self.path.display()))?;
        let contents: TokenFileContents = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse token file: {}", self.path.display()))?;

        if contents.refresh_token.trim().is_empty() {
            anyhow::bail!("Token file {} has an empty refresh_token", self.path.display());
        }

        let expires_at = contents.expires_at.unwrap_or_else(|| {
            tracing::debug!("Token file has no expires_at; treating access token as expired");
            now - Duration::seconds(1)
        });

        Ok(Credentials::new(
            contents.access_token,
            contents.refresh_token,
            expires_at,
        ))
    }

    /// Replace the file with `credentials`.
    pub fn save(&self, credentials: &Credentials, now: DateTime<Utc>) -> Result<()> {
        let contents = TokenFileContents {
            access_token: credentials.access_token.expose_secret().to_string(),
            refresh_token: credentials.refresh_token.expose_secret().to_string(),
            token_type: Some("Bearer".to_string()),
            expires_in: Some((credentials.expires_at - now).num_seconds().max(0)),
            expires_at: Some(credentials.expires_at),
        };
        let json =
            serde_json::to_string_pretty(&contents).context("Failed to serialize tokens")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create token dir: {}", parent.display()))?;
        }
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write token file: {}", self.path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| {
                    format!("Failed to restrict token file: {}", self.path.display())
                })?;
        }

        Ok(())
    }
}
