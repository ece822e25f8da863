//! Error taxonomy for the API client and validation pipeline.

use crate::models::DateRange;

/// A payload that failed schema validation.
///
/// `field` is the path of the offending field (e.g. `id` or
/// `transferItems[0].instrument`).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid field {field:?}{}: {reason}", record_suffix(.record_id))]
pub struct ValidationError {
    pub field: String,
    pub record_id: Option<String>,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            record_id: None,
            reason: reason.into(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(field, "missing required field")
    }

    pub fn with_record_id(mut self, record_id: impl Into<String>) -> Self {
        self.record_id = Some(record_id.into());
        self
    }

    /// Prefix the field path, used when validating nested entries.
    pub fn nested(mut self, parent: &str) -> Self {
        self.field = format!("{parent}.{}", self.field);
        self
    }
}

fn record_suffix(record_id: &Option<String>) -> String {
    record_id
        .as_ref()
        .map(|id| format!(" in record {id}"))
        .unwrap_or_default()
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Token invalid or expired beyond recovery; needs re-authorization.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Rate limit, server error or network failure that outlived its retries.
    #[error("transient API failure after {attempts} attempts ({reason})")]
    Transient { attempts: u32, reason: String },

    /// Malformed request; never retried.
    #[error("request rejected ({status}): {body}")]
    ClientRequest { status: u16, body: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A sub-range of a transaction fetch failed terminally.
    #[error("fetching {range} failed: {source}")]
    SubRange {
        range: DateRange,
        #[source]
        source: Box<ApiError>,
    },

    #[error("no linked account with number {0}")]
    UnknownAccount(String),

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("fetch cancelled")]
    Cancelled,

    /// Success response whose body is not JSON.
    #[error("failed to decode response from {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl ApiError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transient { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_field_and_record() {
        let err = ValidationError::missing("instrument")
            .nested("transferItems[2]")
            .with_record_id("T9");
        assert_eq!(err.field, "transferItems[2].instrument");
        assert_eq!(
            err.to_string(),
            "invalid field \"transferItems[2].instrument\" in record T9: missing required field"
        );
    }

    #[test]
    fn validation_error_without_record_id() {
        let err: Box<dyn std::error::Error> = Box::new(ValidationError::missing("id"));
        assert_eq!(err.to_string(), "invalid field \"id\": missing required field");
    }

    #[test]
    fn sub_range_error_mentions_range() {
        let range = DateRange::new(
            chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap();
        let err = ApiError::SubRange {
            range,
            source: Box::new(ApiError::Transient {
                attempts: 3,
                reason: "HTTP 503".to_string(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("2024-01-01..=2024-01-31"), "{msg}");
        assert!(msg.contains("HTTP 503"), "{msg}");
    }
}
