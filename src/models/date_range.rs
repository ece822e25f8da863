use std::fmt;

use chrono::{Days, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// An inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ApiError> {
        if start > end {
            return Err(ApiError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single_day(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of calendar days covered, counting both ends.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Split into consecutive sub-ranges of at most `max_days` days each.
    ///
    /// The pieces are in chronological order, cover every day of `self`
    /// exactly once, and only the last one may be shorter than `max_days`.
    pub fn split(&self, max_days: u32) -> Vec<DateRange> {
        let max_days = u64::from(max_days.max(1));
        let piece_count = self.days() as u64 / max_days + 1;
        let mut pieces = Vec::with_capacity(piece_count as usize);
        let mut cursor = self.start;
        loop {
            let piece_end = cursor
                .checked_add_days(Days::new(max_days - 1))
                .map_or(self.end, |d| d.min(self.end));
            pieces.push(DateRange {
                start: cursor,
                end: piece_end,
            });
            if piece_end >= self.end {
                break;
            }
            cursor = piece_end + Duration::days(1);
        }
        pieces
    }

    /// Lower bound query value: midnight UTC of the first day.
    pub fn start_timestamp(&self) -> String {
        format!("{}T00:00:00.000Z", self.start.format("%Y-%m-%d"))
    }

    /// Upper bound query value: last millisecond of the final day.
    pub fn end_timestamp(&self) -> String {
        format!("{}T23:59:59.999Z", self.end.format("%Y-%m-%d"))
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}
