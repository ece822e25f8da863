//! Date-ranged transaction retrieval.
//!
//! The transactions endpoint caps how many days one call may span, so a
//! request is split into consecutive sub-ranges that are fetched
//! independently and stitched back together in chronological order.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use serde_json::Value;

use super::{CancelSignal, Transport};
use crate::error::{ApiError, ValidationError};
use crate::models::DateRange;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Longest span, in days, a single request may cover.
    pub max_span_days: u32,
    /// Extra attempts for a sub-range that failed with a transient error.
    pub sub_range_retries: u32,
    pub retry_delay: Duration,
    /// Sub-ranges in flight at once.
    pub concurrency: usize,
    /// Optional `types` filter, e.g. `TRADE`.
    pub types: Option<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_span_days: 365,
            sub_range_retries: 2,
            retry_delay: Duration::from_secs(1),
            concurrency: 1,
            types: None,
        }
    }
}

pub fn transactions_path(account_hash: &str) -> String {
    format!("/accounts/{account_hash}/transactions")
}

/// Raw payloads returned for one sub-range, in API order.
#[derive(Debug, Clone)]
pub struct SubRangePage {
    pub range: DateRange,
    pub transactions: Vec<Value>,
}

pub struct TransactionFetcher {
    transport: Arc<dyn Transport>,
    options: FetchOptions,
}

impl TransactionFetcher {
    pub fn new(transport: Arc<dyn Transport>, options: FetchOptions) -> Self {
        Self { transport, options }
    }

    /// Plan the retrieval of `range` for `account_hash`. Nothing is sent
    /// until the returned plan is streamed.
    pub fn fetch_transactions(&self, account_hash: &str, range: DateRange) -> FetchPlan {
        FetchPlan {
            transport: self.transport.clone(),
            account_hash: account_hash.to_string(),
            sub_ranges: range.split(self.options.max_span_days),
            options: self.options.clone(),
            cancel: CancelSignal::new(),
        }
    }
}

/// A finite, restartable sequence of raw transaction payloads.
///
/// Each call to [`FetchPlan::stream`] starts over from the first sub-range
/// and re-issues the same requests.
pub struct FetchPlan {
    transport: Arc<dyn Transport>,
    account_hash: String,
    sub_ranges: Vec<DateRange>,
    options: FetchOptions,
    cancel: CancelSignal,
}

impl FetchPlan {
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn sub_ranges(&self) -> &[DateRange] {
        &self.sub_ranges
    }

    /// One page per sub-range, chronological regardless of which request
    /// finishes first.
    pub fn pages(&self) -> BoxStream<'static, Result<SubRangePage, ApiError>> {
        let transport = self.transport.clone();
        let path = transactions_path(&self.account_hash);
        let options = self.options.clone();
        let cancel = self.cancel.clone();
        let concurrency = self.options.concurrency.max(1);

        stream::iter(self.sub_ranges.clone())
            .map(move |range| {
                fetch_sub_range(
                    transport.clone(),
                    path.clone(),
                    range,
                    options.clone(),
                    cancel.clone(),
                )
            })
            .buffered(concurrency)
            .boxed()
    }

    /// Raw payloads of the whole range, flattened in order.
    pub fn stream(&self) -> BoxStream<'static, Result<Value, ApiError>> {
        self.pages()
            .map_ok(|page| stream::iter(page.transactions.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }

    /// Drain [`FetchPlan::stream`] into a vector, stopping at the first error.
    pub async fn collect(&self) -> Result<Vec<Value>, ApiError> {
        self.stream().try_collect().await
    }
}

async fn fetch_sub_range(
    transport: Arc<dyn Transport>,
    path: String,
    range: DateRange,
    options: FetchOptions,
    cancel: CancelSignal,
) -> Result<SubRangePage, ApiError> {
    let mut query = vec![
        ("startDate", range.start_timestamp()),
        ("endDate", range.end_timestamp()),
    ];
    if let Some(types) = &options.types {
        query.push(("types", types.clone()));
    }

    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            tracing::debug!(%range, "Fetch cancelled before request");
            return Err(ApiError::Cancelled);
        }
        attempt += 1;

        match transport.request(&path, &query).await {
            Ok(Value::Array(transactions)) => {
                tracing::debug!(%range, count = transactions.len(), "Fetched sub-range");
                return Ok(SubRangePage {
                    range,
                    transactions,
                });
            }
            Ok(_) => {
                return Err(ApiError::SubRange {
                    range,
                    source: Box::new(
                        ValidationError::new("transactions", "expected a JSON array").into(),
                    ),
                });
            }
            Err(e) if e.is_transient() && attempt <= options.sub_range_retries => {
                tracing::warn!(%range, attempt, error = %e, "Sub-range failed, retrying it");
                tokio::time::sleep(options.retry_delay).await;
            }
            Err(e) => {
                return Err(ApiError::SubRange {
                    range,
                    source: Box::new(e),
                });
            }
        }
    }
}
