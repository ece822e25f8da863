use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Duration;
use secrecy::SecretString;
use tokio::sync::Mutex;

use super::{Credentials, TokenFile, TokenRefresher};
use crate::clock::{Clock, SystemClock};
use crate::error::ApiError;

/// Lock-guarded credential cell with single-flight refresh.
pub struct CredentialStore {
    cell: Mutex<Credentials>,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
    margin: Duration,
    token_file: Option<TokenFile>,
    refreshes: AtomicU64,
}

impl CredentialStore {
    pub fn new(credentials: Credentials, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            cell: Mutex::new(credentials),
            refresher,
            clock: Arc::new(SystemClock),
            margin: Duration::seconds(60),
            token_file: None,
            refreshes: AtomicU64::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Minimum remaining validity a returned token must have.
    pub fn with_margin(mut self, margin: std::time::Duration) -> Self {
        self.margin = Duration::from_std(margin).unwrap_or(Duration::seconds(60));
        self
    }

    /// Write refreshed credentials back to `file`.
    pub fn with_token_file(mut self, file: TokenFile) -> Self {
        self.token_file = Some(file);
        self
    }

    /// Number of refreshes performed so far.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Return an access token valid for at least the configured margin,
    /// refreshing first if needed.
    pub async fn get_valid_token(&self) -> Result<SecretString, ApiError> {
        let mut guard = self.cell.lock().await;
        if guard.is_fresh(self.clock.now(), self.margin) {
            return Ok(guard.access_token.clone());
        }
        tracing::debug!(expires_at = %guard.expires_at, "Access token near expiry, refreshing");
        self.refresh_locked(&mut guard).await
    }

    /// Refresh after the server rejected `rejected`.
    ///
    /// If another caller already swapped in a different token, that one is
    /// returned without a second refresh.
    pub async fn force_refresh(&self, rejected: &SecretString) -> Result<SecretString, ApiError> {
        let mut guard = self.cell.lock().await;
        if !guard.same_access_token(rejected) {
            return Ok(guard.access_token.clone());
        }
        tracing::warn!("Access token rejected by server, forcing refresh");
        self.refresh_locked(&mut guard).await
    }

    async fn refresh_locked(&self, current: &mut Credentials) -> Result<SecretString, ApiError> {
        let fresh = self.refresher.refresh(&current.refresh_token).await?;
        self.refreshes.fetch_add(1, Ordering::SeqCst);

        if !fresh.is_fresh(self.clock.now(), self.margin) {
            tracing::warn!(
                expires_at = %fresh.expires_at,
                "Refreshed access token expires within the safety margin"
            );
        }
        if let Some(file) = &self.token_file {
            if let Err(e) = file.save(&fresh, self.clock.now()) {
                tracing::warn!(error = %e, path = %file.path().display(), "Failed to persist refreshed tokens");
            }
        }

        *current = fresh;
        tracing::info!(expires_at = %current.expires_at, "Access token refreshed");
        Ok(current.access_token.clone())
    }
}
