//! Entry point for callers: account number and dates in, validated records out.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::client::{
    AccountResolver, CancelSignal, FetchOptions, HttpTransport, TransactionFetcher, Transport,
};
use crate::clock::{Clock, SystemClock};
use crate::config::ResolvedConfig;
use crate::credentials::{CredentialStore, OAuthRefresher, TokenFile};
use crate::error::ApiError;
use crate::models::{Account, DateRange};
use crate::normalize::{normalize_all, TransactionBatch, ValidationMode};
use crate::options::{option_legs, OptionLeg};

pub struct TransactionService {
    transport: Arc<dyn Transport>,
    options: FetchOptions,
    mode: ValidationMode,
}

impl TransactionService {
    pub fn new(transport: Arc<dyn Transport>, options: FetchOptions, mode: ValidationMode) -> Self {
        Self {
            transport,
            options,
            mode,
        }
    }

    /// Wire up the HTTP stack described by `config`: token file, OAuth
    /// refresher, credential store and transport.
    pub fn connect(config: &ResolvedConfig) -> Result<Self, ApiError> {
        let settings = &config.config;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let http = HttpTransport::build_client(settings.client.request_timeout)?;

        let token_file = TokenFile::new(&config.token_file);
        let credentials = token_file
            .load(clock.now())
            .map_err(|e| ApiError::Config(format!("{e:#}")))?;
        let (client_id, client_secret) = settings
            .client_credentials()
            .map_err(|e| ApiError::Config(format!("{e:#}")))?;

        let refresher = OAuthRefresher::new(http.clone(), client_id, client_secret)
            .with_token_url(settings.token_url.clone())
            .with_clock(clock.clone());
        let store = CredentialStore::new(credentials, Arc::new(refresher))
            .with_clock(clock)
            .with_margin(settings.client.refresh_margin)
            .with_token_file(token_file);

        let transport = HttpTransport::new(http, Arc::new(store))
            .with_base_url(settings.api_base.clone())
            .with_retry_policy(settings.retry_policy());

        Ok(Self::new(
            Arc::new(transport),
            settings.fetch_options(),
            settings.fetch.validation,
        ))
    }

    pub fn with_validation(mut self, mode: ValidationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Restrict fetched transactions to one API `types` value.
    pub fn with_types(mut self, types: Option<String>) -> Self {
        self.options.types = types;
        self
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, ApiError> {
        AccountResolver::new(self.transport.clone()).list_accounts().await
    }

    /// Validated transactions of `account_number` between `start` and `end`,
    /// both inclusive, in chronological sub-range order.
    pub async fn get_transactions(
        &self,
        account_number: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TransactionBatch, ApiError> {
        self.get_transactions_with(account_number, start, end, &CancelSignal::new())
            .await
    }

    pub async fn get_transactions_with(
        &self,
        account_number: &str,
        start: NaiveDate,
        end: NaiveDate,
        cancel: &CancelSignal,
    ) -> Result<TransactionBatch, ApiError> {
        let range = DateRange::new(start, end)?;
        let account = AccountResolver::new(self.transport.clone())
            .find_account(account_number)
            .await?;

        let plan = TransactionFetcher::new(self.transport.clone(), self.options.clone())
            .fetch_transactions(&account.account_hash, range)
            .with_cancel(cancel.clone());
        tracing::info!(
            account = %account.masked_number(),
            %range,
            sub_ranges = plan.sub_ranges().len(),
            "Fetching transactions"
        );

        let raws = plan.collect().await?;
        let batch = normalize_all(&raws, self.mode)?;
        tracing::info!(
            account = %account.masked_number(),
            fetched = raws.len(),
            kept = batch.records.len(),
            skipped = batch.skipped_count(),
            duplicates = batch.duplicates,
            "Transactions normalized"
        );
        Ok(batch)
    }

    /// Option legs traded in the window, optionally for one underlying.
    pub async fn get_option_legs(
        &self,
        account_number: &str,
        start: NaiveDate,
        end: NaiveDate,
        underlying: Option<&str>,
        cancel: &CancelSignal,
    ) -> Result<Vec<OptionLeg>, ApiError> {
        let batch = self
            .get_transactions_with(account_number, start, end, cancel)
            .await?;
        Ok(option_legs(&batch.records, underlying))
    }
}
