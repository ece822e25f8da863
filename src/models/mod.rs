mod account;
mod date_range;
mod transaction;

pub use account::Account;
pub use date_range::DateRange;
pub use transaction::{TransactionKind, TransactionRecord, TransferItem};
