//! Option legs pulled out of normalized trades.
//!
//! Option instruments carry an OCC symbol: the root padded to six
//! characters, a `YYMMDD` expiration, `C`/`P`, then the strike times 1000
//! as eight digits (`AAPL  240119C00150000`).

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::TransactionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PutCall {
    Call,
    Put,
}

impl fmt::Display for PutCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PutCall::Call => "CALL",
            PutCall::Put => "PUT",
        })
    }
}

/// A parsed OCC option symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionContract {
    pub underlying: String,
    pub expiration: NaiveDate,
    pub put_call: PutCall,
    pub strike: Decimal,
}

/// One option transfer item together with the transaction it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionLeg {
    pub transaction_id: String,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub contract: OptionContract,
    pub quantity: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_effect: Option<String>,
}

fn occ_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Z0-9./]{1,6})\s*(\d{6})([CP])(\d{8})$").expect("OCC pattern is valid")
    })
}

/// Parse an OCC option symbol. Returns `None` for anything else.
pub fn parse_option_symbol(symbol: &str) -> Option<OptionContract> {
    let caps = occ_pattern().captures(symbol.trim())?;
    let expiration = NaiveDate::parse_from_str(&caps[2], "%y%m%d").ok()?;
    let put_call = match &caps[3] {
        "C" => PutCall::Call,
        _ => PutCall::Put,
    };
    let strike_millis: i64 = caps[4].parse().ok()?;
    Some(OptionContract {
        underlying: caps[1].to_string(),
        expiration,
        put_call,
        strike: Decimal::new(strike_millis, 3),
    })
}

/// Collect option legs from `records`, optionally limited to one underlying.
///
/// Items flagged as options whose symbol does not parse are skipped with a
/// warning.
pub fn option_legs(records: &[TransactionRecord], underlying: Option<&str>) -> Vec<OptionLeg> {
    let mut legs = Vec::new();
    for record in records {
        for item in record.items().iter().filter(|item| item.is_option()) {
            let Some(contract) = parse_option_symbol(&item.instrument) else {
                tracing::warn!(
                    transaction_id = %record.transaction_id,
                    symbol = %item.instrument,
                    "Skipping option leg with unparseable symbol"
                );
                continue;
            };
            if let Some(wanted) = underlying {
                let leg_underlying = item
                    .underlying_symbol
                    .as_deref()
                    .unwrap_or(&contract.underlying);
                if !leg_underlying.eq_ignore_ascii_case(wanted) {
                    continue;
                }
            }
            legs.push(OptionLeg {
                transaction_id: record.transaction_id.clone(),
                timestamp: record.timestamp,
                symbol: item.instrument.clone(),
                contract,
                quantity: item.quantity,
                price: item.price,
                cost: item.cost,
                position_effect: item.position_effect.clone(),
            });
        }
    }
    legs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TransactionKind, TransferItem};
    use chrono::TimeZone;
    use std::str::FromStr;

    #[test]
    fn parses_padded_occ_symbol() {
        let contract = parse_option_symbol("AAPL  240119C00150000").unwrap();
        assert_eq!(contract.underlying, "AAPL");
        assert_eq!(contract.expiration, NaiveDate::from_ymd_opt(2024, 1, 19).unwrap());
        assert_eq!(contract.put_call, PutCall::Call);
        assert_eq!(contract.strike, Decimal::from_str("150.000").unwrap());

        let put = parse_option_symbol("SPY   250321P00512500").unwrap();
        assert_eq!(put.put_call, PutCall::Put);
        assert_eq!(put.strike, Decimal::from_str("512.5").unwrap());
    }

    #[test]
    fn rejects_non_option_symbols() {
        assert_eq!(parse_option_symbol("AAPL"), None);
        assert_eq!(parse_option_symbol("AAPL  241399C00150000"), None);
        assert_eq!(parse_option_symbol("AAPL  240119X00150000"), None);
    }

    fn option_item(symbol: &str, underlying: &str) -> TransferItem {
        TransferItem {
            asset_type: Some("OPTION".to_string()),
            underlying_symbol: Some(underlying.to_string()),
            position_effect: Some("OPENING".to_string()),
            ..TransferItem::new(symbol, Decimal::ONE)
        }
    }

    #[test]
    fn extracts_and_filters_option_legs() {
        let record = TransactionRecord {
            transaction_id: "T1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap(),
            amount: Decimal::from_str("-300").unwrap(),
            description: String::new(),
            kind: TransactionKind::Trade {
                items: vec![
                    TransferItem::new("CURRENCY_USD", Decimal::ONE),
                    option_item("AAPL  240119C00150000", "AAPL"),
                    option_item("MSFT  240119P00300000", "MSFT"),
                    option_item("garbage", "MSFT"),
                ],
            },
        };
        let records = vec![record];

        let all = option_legs(&records, None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].contract.underlying, "AAPL");
        assert_eq!(all[0].position_effect.as_deref(), Some("OPENING"));

        let msft = option_legs(&records, Some("msft"));
        assert_eq!(msft.len(), 1);
        assert_eq!(msft[0].contract.put_call, PutCall::Put);
    }
}
