//! Validation boundary between raw API payloads and [`TransactionRecord`].
//!
//! Payloads come in two spellings: the compact one (`id`, `timestamp`,
//! `amount`, `qty`) and the Trader API one (`activityId`, `time`,
//! `netAmount`, transfer item `amount`). Both are accepted; error field
//! names use the compact spelling when a field is missing entirely.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ApiError, ValidationError};
use crate::models::{TransactionKind, TransactionRecord, TransferItem};

/// What to do with a record that fails validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Fail the whole fetch on the first invalid record.
    #[default]
    Strict,
    /// Skip invalid records and count them.
    Lenient,
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(ValidationMode::Strict),
            "lenient" => Ok(ValidationMode::Lenient),
            other => Err(format!("unknown validation mode {other:?} (strict or lenient)")),
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValidationMode::Strict => "strict",
            ValidationMode::Lenient => "lenient",
        })
    }
}

/// A payload dropped in lenient mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    /// Position of the payload in the fetched sequence.
    pub index: usize,
    pub error: ValidationError,
}

/// Normalized records of one fetch window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionBatch {
    pub records: Vec<TransactionRecord>,
    pub skipped: Vec<SkippedRecord>,
    /// Payloads dropped because their id was already seen in this window.
    pub duplicates: usize,
}

impl TransactionBatch {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Validate one raw payload.
pub fn normalize(raw: &Value) -> Result<TransactionRecord, ValidationError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| ValidationError::new("$", "expected a JSON object"))?;

    let transaction_id = parse_id(obj)?;
    let attach_id = |e: ValidationError| e.with_record_id(transaction_id.clone());

    let raw_type = required_str(obj, "type").map_err(attach_id)?;
    let timestamp = parse_timestamp(obj).map_err(attach_id)?;
    let amount = required_decimal(obj, &["amount", "netAmount"]).map_err(attach_id)?;
    let description = match obj.get("description") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => return Err(attach_id(ValidationError::new("description", "expected a string"))),
    };

    let kind = match raw_type.as_str() {
        "TRADE" => TransactionKind::Trade {
            items: parse_items(obj).map_err(attach_id)?,
        },
        "TRANSFER" | "RECEIVE_AND_DELIVER" | "JOURNAL" | "ACH_RECEIPT" | "ACH_DISBURSEMENT"
        | "CASH_RECEIPT" | "CASH_DISBURSEMENT" | "WIRE_IN" | "WIRE_OUT" | "ELECTRONIC_FUND" => {
            TransactionKind::Transfer {
                items: parse_items(obj).map_err(attach_id)?,
            }
        }
        "DIVIDEND" | "DIVIDEND_OR_INTEREST" => TransactionKind::Dividend,
        "FEE" | "SERVICE_FEE" => TransactionKind::Fee,
        _ => TransactionKind::Other { raw_type },
    };

    Ok(TransactionRecord {
        transaction_id,
        timestamp,
        amount,
        description,
        kind,
    })
}

/// Normalize a fetched sequence according to `mode`.
///
/// Strict mode returns the first validation error. Lenient mode logs and
/// skips invalid payloads. Either way a repeated transaction id keeps only
/// its first occurrence.
pub fn normalize_all(raws: &[Value], mode: ValidationMode) -> Result<TransactionBatch, ApiError> {
    let mut batch = TransactionBatch::default();
    let mut seen = HashSet::new();

    for (index, raw) in raws.iter().enumerate() {
        match normalize(raw) {
            Ok(record) => {
                if !seen.insert(record.transaction_id.clone()) {
                    tracing::warn!(
                        index,
                        transaction_id = %record.transaction_id,
                        "Dropping duplicate transaction"
                    );
                    batch.duplicates += 1;
                    continue;
                }
                batch.records.push(record);
            }
            Err(error) if mode == ValidationMode::Strict => return Err(error.into()),
            Err(error) => {
                tracing::warn!(
                    index,
                    field = %error.field,
                    record_id = ?error.record_id,
                    reason = %error.reason,
                    "Skipping invalid transaction"
                );
                batch.skipped.push(SkippedRecord { index, error });
            }
        }
    }

    if !batch.skipped.is_empty() {
        tracing::warn!(
            skipped = batch.skipped.len(),
            kept = batch.records.len(),
            "Some transactions failed validation"
        );
    }
    Ok(batch)
}

/// First non-null value among `names`, with the name it was found under.
fn lookup<'a>(obj: &'a Map<String, Value>, names: &[&'static str]) -> Option<(&'static str, &'a Value)> {
    names
        .iter()
        .find_map(|name| obj.get(*name).filter(|v| !v.is_null()).map(|v| (*name, v)))
}

fn parse_id(obj: &Map<String, Value>) -> Result<String, ValidationError> {
    match lookup(obj, &["id", "activityId"]) {
        None => Err(ValidationError::missing("id")),
        Some((_, Value::String(s))) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some((_, Value::Number(n))) if n.is_u64() || n.is_i64() => Ok(n.to_string()),
        Some((name, _)) => Err(ValidationError::new(name, "expected a non-empty string or integer")),
    }
}

fn required_str(obj: &Map<String, Value>, name: &'static str) -> Result<String, ValidationError> {
    match obj.get(name) {
        None | Some(Value::Null) => Err(ValidationError::missing(name)),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(_) => Err(ValidationError::new(name, "expected a non-empty string")),
    }
}

fn parse_timestamp(obj: &Map<String, Value>) -> Result<DateTime<Utc>, ValidationError> {
    let (name, value) = lookup(obj, &["timestamp", "time", "tradeDate"])
        .ok_or_else(|| ValidationError::missing("timestamp"))?;
    let text = value
        .as_str()
        .ok_or_else(|| ValidationError::new(name, "expected a date or timestamp string"))?;
    parse_timestamp_str(text.trim())
        .ok_or_else(|| ValidationError::new(name, format!("unparseable timestamp {text:?}")))
}

fn parse_timestamp_str(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn decimal_from(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn required_decimal(
    obj: &Map<String, Value>,
    names: &[&'static str],
) -> Result<Decimal, ValidationError> {
    let (name, value) = lookup(obj, names).ok_or_else(|| ValidationError::missing(names[0]))?;
    decimal_from(value).ok_or_else(|| ValidationError::new(name, format!("not a decimal: {value}")))
}

fn optional_decimal(
    obj: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<Decimal>, ValidationError> {
    match lookup(obj, &[name]) {
        None => Ok(None),
        Some((_, value)) => decimal_from(value)
            .map(Some)
            .ok_or_else(|| ValidationError::new(name, format!("not a decimal: {value}"))),
    }
}

fn optional_str(obj: &Map<String, Value>, name: &str) -> Option<String> {
    obj.get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_items(obj: &Map<String, Value>) -> Result<Vec<TransferItem>, ValidationError> {
    match obj.get("transferItems") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| parse_item(item).map_err(|e| e.nested(&format!("transferItems[{i}]"))))
            .collect(),
        Some(_) => Err(ValidationError::new("transferItems", "expected an array")),
    }
}

fn parse_item(raw: &Value) -> Result<TransferItem, ValidationError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| ValidationError::new("$", "expected a JSON object"))?;

    let (instrument, asset_type, underlying_symbol) = match obj.get("instrument") {
        Some(Value::String(s)) if !s.trim().is_empty() => (s.trim().to_string(), None, None),
        Some(Value::Object(inst)) => {
            let symbol = optional_str(inst, "symbol")
                .or_else(|| optional_str(inst, "cusip"))
                .ok_or_else(|| ValidationError::missing("instrument.symbol"))?;
            (
                symbol,
                optional_str(inst, "assetType"),
                optional_str(inst, "underlyingSymbol"),
            )
        }
        None | Some(Value::Null) => return Err(ValidationError::missing("instrument")),
        Some(_) => {
            return Err(ValidationError::new(
                "instrument",
                "expected a symbol string or instrument object",
            ))
        }
    };

    Ok(TransferItem {
        instrument,
        quantity: required_decimal(obj, &["qty", "amount"])?,
        cost: optional_decimal(obj, "cost")?,
        price: optional_decimal(obj, "price")?,
        asset_type,
        underlying_symbol,
        position_effect: optional_str(obj, "positionEffect"),
        fee_type: optional_str(obj, "feeType"),
    })
}
