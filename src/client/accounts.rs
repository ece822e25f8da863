use std::sync::Arc;

use serde_json::Value;

use super::Transport;
use crate::error::{ApiError, ValidationError};
use crate::models::Account;

pub const ACCOUNT_NUMBERS_PATH: &str = "/accounts/accountNumbers";

/// Maps linked account numbers to the hashes the API wants.
pub struct AccountResolver {
    transport: Arc<dyn Transport>,
}

impl AccountResolver {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Fetch every linked account. Results are not cached.
    pub async fn list_accounts(&self) -> Result<Vec<Account>, ApiError> {
        let body = self.transport.request(ACCOUNT_NUMBERS_PATH, &[]).await?;
        let entries = body
            .as_array()
            .ok_or_else(|| ValidationError::new("accountNumbers", "expected a JSON array"))?;

        let accounts = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| parse_account(i, entry))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(count = accounts.len(), "Resolved linked accounts");
        Ok(accounts)
    }

    /// Find the account with `account_number`.
    pub async fn find_account(&self, account_number: &str) -> Result<Account, ApiError> {
        self.list_accounts()
            .await?
            .into_iter()
            .find(|a| a.account_number == account_number)
            .ok_or_else(|| ApiError::UnknownAccount(account_number.to_string()))
    }
}

fn parse_account(index: usize, entry: &Value) -> Result<Account, ValidationError> {
    let field = |name: &str| -> Result<String, ValidationError> {
        entry
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ValidationError::missing(format!("[{index}].{name}")))
    };
    Ok(Account::new(field("accountNumber")?, field("hashValue")?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_account_requires_both_fields() {
        let ok = parse_account(0, &json!({"accountNumber": "1234", "hashValue": "ABC"})).unwrap();
        assert_eq!(ok, Account::new("1234", "ABC"));

        let err = parse_account(3, &json!({"accountNumber": "1234"})).unwrap_err();
        assert_eq!(err.field, "[3].hashValue");

        let err = parse_account(0, &json!({"accountNumber": "", "hashValue": "X"})).unwrap_err();
        assert_eq!(err.field, "[0].accountNumber");
    }
}
