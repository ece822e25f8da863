use serde::{Deserialize, Serialize};

/// A linked brokerage account.
///
/// `account_hash` is the opaque identifier the API requires in place of the
/// account number for every account-scoped endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_number: String,
    pub account_hash: String,
}

impl Account {
    pub fn new(account_number: impl Into<String>, account_hash: impl Into<String>) -> Self {
        Self {
            account_number: account_number.into(),
            account_hash: account_hash.into(),
        }
    }

    /// Account number with all but the last four digits masked, for logs.
    pub fn masked_number(&self) -> String {
        let len = self.account_number.chars().count();
        if len <= 4 {
            return self.account_number.clone();
        }
        let tail: String = self.account_number.chars().skip(len - 4).collect();
        format!("{}{tail}", "*".repeat(len - 4))
    }
}
