//! Human-readable rendering of normalized transactions.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{TransactionRecord, TransferItem};

/// Render one header line per transaction, each followed by an indented line
/// per transfer item.
pub fn report(records: &[TransactionRecord]) -> Vec<String> {
    let mut lines = Vec::with_capacity(records.len());
    for record in records {
        lines.push(header_line(record));
        lines.extend(record.items().iter().map(item_line));
    }
    lines
}

/// Emit [`report`] through `tracing` at info level.
pub fn log_report(records: &[TransactionRecord]) {
    for line in report(records) {
        tracing::info!("{line}");
    }
}

fn header_line(record: &TransactionRecord) -> String {
    let mut line = format!(
        "{} {:<8} {} {}",
        record.timestamp.format("%Y-%m-%d"),
        record.kind.label(),
        record.transaction_id,
        format_money(record.amount)
    );
    if !record.description.is_empty() {
        line.push_str(&format!(" \"{}\"", record.description));
    }
    line
}

fn item_line(item: &TransferItem) -> String {
    let mut line = format!("  {} qty {}", item.instrument, item.quantity.normalize());
    if let Some(cost) = item.cost {
        line.push_str(&format!(" cost {}", format_money(cost)));
    }
    if let Some(price) = item.price {
        line.push_str(&format!(" @ {}", price.normalize()));
    }
    if let Some(effect) = &item.position_effect {
        line.push_str(&format!(" [{effect}]"));
    }
    if let Some(fee) = &item.fee_type {
        line.push_str(&format!(" fee {fee}"));
    }
    line
}

/// `-$1,234.50` style: two decimals, grouped thousands, sign before symbol.
fn format_money(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        let remaining = int_part.len() - i;
        if i > 0 && remaining % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{}${grouped}.{frac_part}", if negative { "-" } else { "" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionKind;
    use chrono::{TimeZone, Utc};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn money_is_grouped_and_signed() {
        assert_eq!(format_money(dec("-150")), "-$150.00");
        assert_eq!(format_money(dec("1234567.5")), "$1,234,567.50");
        assert_eq!(format_money(dec("0.004")), "$0.00");
        assert_eq!(format_money(dec("-0.001")), "$0.00");
        assert_eq!(format_money(dec("999.995")), "$1,000.00");
    }

    #[test]
    fn transfer_renders_header_and_item() {
        let record = TransactionRecord {
            transaction_id: "T1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap(),
            amount: dec("-150.00"),
            description: String::new(),
            kind: TransactionKind::Transfer {
                items: vec![TransferItem::new("AAPL", Decimal::ONE).with_cost(dec("150.00"))],
            },
        };

        assert_eq!(
            report(&[record]),
            vec![
                "2024-01-05 TRANSFER T1 -$150.00".to_string(),
                "  AAPL qty 1 cost $150.00".to_string(),
            ]
        );
    }

    #[test]
    fn dividend_has_no_item_lines() {
        let record = TransactionRecord {
            transaction_id: "D1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 2, 1, 15, 30, 0).unwrap(),
            amount: dec("12.5"),
            description: "ORDINARY DIVIDEND".to_string(),
            kind: TransactionKind::Dividend,
        };

        assert_eq!(
            report(&[record]),
            vec!["2024-02-01 DIVIDEND D1 $12.50 \"ORDINARY DIVIDEND\"".to_string()]
        );
        assert!(report(&[]).is_empty());
    }
}
