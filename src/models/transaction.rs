use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One instrument leg of a trade or transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferItem {
    /// Symbol (or CUSIP when no symbol is reported).
    pub instrument: String,
    pub quantity: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    /// e.g. `EQUITY`, `OPTION`, `CURRENCY`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underlying_symbol: Option<String>,
    /// `OPENING` / `CLOSING` for option legs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_effect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_type: Option<String>,
}

impl TransferItem {
    pub fn new(instrument: impl Into<String>, quantity: Decimal) -> Self {
        Self {
            instrument: instrument.into(),
            quantity,
            cost: None,
            price: None,
            asset_type: None,
            underlying_symbol: None,
            position_effect: None,
            fee_type: None,
        }
    }

    pub fn with_cost(mut self, cost: Decimal) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn is_option(&self) -> bool {
        self.asset_type.as_deref() == Some("OPTION")
    }
}

/// Transaction kind, carrying the data only some kinds have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransactionKind {
    Trade { items: Vec<TransferItem> },
    Transfer { items: Vec<TransferItem> },
    Dividend,
    Fee,
    /// A type string this client does not know about yet.
    Other { raw_type: String },
}

impl TransactionKind {
    pub fn label(&self) -> &str {
        match self {
            TransactionKind::Trade { .. } => "TRADE",
            TransactionKind::Transfer { .. } => "TRANSFER",
            TransactionKind::Dividend => "DIVIDEND",
            TransactionKind::Fee => "FEE",
            TransactionKind::Other { raw_type } => raw_type,
        }
    }

    pub fn items(&self) -> &[TransferItem] {
        match self {
            TransactionKind::Trade { items } | TransactionKind::Transfer { items } => items,
            _ => &[],
        }
    }
}

/// A validated transaction. Built only by [`crate::normalize::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: String,
    pub timestamp: DateTime<Utc>,
    /// Signed amount: credits positive, debits negative.
    pub amount: Decimal,
    pub description: String,
    #[serde(flatten)]
    pub kind: TransactionKind,
}

impl TransactionRecord {
    pub fn items(&self) -> &[TransferItem] {
        self.kind.items()
    }
}
