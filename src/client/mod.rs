//! Brokerage API client: transport, account resolution and ranged fetches.

mod accounts;
mod cancel;
mod fetch;
mod transport;

pub use accounts::{AccountResolver, ACCOUNT_NUMBERS_PATH};
pub use cancel::CancelSignal;
pub use fetch::{transactions_path, FetchOptions, FetchPlan, SubRangePage, TransactionFetcher};
pub use transport::{HttpTransport, RateGate, RetryPolicy, Transport, DEFAULT_API_BASE};
