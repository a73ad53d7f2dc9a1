//! Lenient date normalization.
//!
//! Dates reach the engine from persisted JSON, user-entered strings and generated
//! values. Everything is funnelled through [`normalize`], which never fails: input
//! that cannot be read as a real calendar date becomes `None` and the caller treats
//! it as absent.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// Years outside this window are treated as garbage rather than dates.
const MIN_YEAR: i32 = 1000;
const MAX_YEAR: i32 = 9999;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    #[error("invalid date '{0}'")]
    InvalidDate(String),
}

/// Any representation a date may arrive in.
#[derive(Debug, Clone, PartialEq)]
pub enum DateInput {
    Null,
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Ymd(i32, u32, u32),
}

impl From<&str> for DateInput {
    fn from(value: &str) -> Self {
        DateInput::Text(value.to_string())
    }
}

impl From<String> for DateInput {
    fn from(value: String) -> Self {
        DateInput::Text(value)
    }
}

impl From<&String> for DateInput {
    fn from(value: &String) -> Self {
        DateInput::Text(value.clone())
    }
}

impl From<NaiveDate> for DateInput {
    fn from(value: NaiveDate) -> Self {
        DateInput::Date(value)
    }
}

impl From<NaiveDateTime> for DateInput {
    fn from(value: NaiveDateTime) -> Self {
        DateInput::DateTime(value)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for DateInput {
    fn from(value: DateTime<Tz>) -> Self {
        DateInput::DateTime(value.naive_local())
    }
}

impl From<(i32, u32, u32)> for DateInput {
    fn from((year, month, day): (i32, u32, u32)) -> Self {
        DateInput::Ymd(year, month, day)
    }
}

impl<T: Into<DateInput>> From<Option<T>> for DateInput {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(DateInput::Null)
    }
}

impl From<&serde_json::Value> for DateInput {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(text) => DateInput::Text(text.clone()),
            // Numbers are epoch milliseconds, the way browser storage serializes them.
            serde_json::Value::Number(number) => number
                .as_i64()
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
                .map(|dt| DateInput::DateTime(dt.naive_utc()))
                .unwrap_or(DateInput::Null),
            _ => DateInput::Null,
        }
    }
}

/// Normalize any supported representation into a calendar date.
///
/// Returns `None` for null, unparseable or out-of-range input. Never panics.
pub fn normalize(input: impl Into<DateInput>) -> Option<NaiveDate> {
    let date = match input.into() {
        DateInput::Null => None,
        DateInput::Date(date) => Some(date),
        DateInput::DateTime(dt) => Some(dt.date()),
        DateInput::Ymd(year, month, day) => NaiveDate::from_ymd_opt(year, month, day),
        DateInput::Text(text) => parse_text(&text),
    };
    date.filter(in_supported_range)
}

/// Strict variant of [`normalize`] for text that must be a date.
pub fn parse_date(input: &str) -> Result<NaiveDate, DateError> {
    normalize(input).ok_or_else(|| DateError::InvalidDate(input.to_string()))
}

/// True when both inputs normalize to the same calendar day. An input that fails
/// to normalize never matches anything, including another invalid input.
pub fn same_day(a: impl Into<DateInput>, b: impl Into<DateInput>) -> bool {
    match (normalize(a), normalize(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Signed number of days from `start` to `end`.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(ISO_DATE_FORMAT).to_string()
}

/// `date + days`, or `None` when the result leaves the supported range.
pub fn add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    date.checked_add_signed(Duration::days(days))
        .filter(in_supported_range)
}

fn in_supported_range(date: &NaiveDate) -> bool {
    (MIN_YEAR..=MAX_YEAR).contains(&date.year())
}

fn parse_text(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }

    // Offset-carrying timestamps keep the calendar day in their own offset.
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.date());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn accepts_common_text_shapes() {
        assert_eq!(normalize("2025-05-20"), Some(d(2025, 5, 20)));
        assert_eq!(normalize("  2025/05/20 "), Some(d(2025, 5, 20)));
        assert_eq!(normalize("2025.05.20"), Some(d(2025, 5, 20)));
        assert_eq!(normalize("2025-05-20T23:59:59Z"), Some(d(2025, 5, 20)));
        assert_eq!(normalize("2025-05-20T01:00:00+09:00"), Some(d(2025, 5, 20)));
        assert_eq!(normalize("2025-05-20T08:30"), Some(d(2025, 5, 20)));
        assert_eq!(normalize("2025-05-20T08:30:15.250"), Some(d(2025, 5, 20)));
        assert_eq!(normalize("2025-05-20 08:30:15"), Some(d(2025, 5, 20)));
    }

    #[test]
    fn rejects_garbage_without_panicking() {
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("tomorrow"), None);
        assert_eq!(normalize("2025-02-30"), None);
        assert_eq!(normalize("2025-13-01"), None);
        assert_eq!(normalize((2025_i32, 2_u32, 29_u32)), None);
        assert_eq!(normalize(None::<&str>), None);
        assert_eq!(normalize(&json!(null)), None);
        assert_eq!(normalize(&json!({"date": "2025-01-01"})), None);
        assert_eq!(normalize("0001-01-01"), None);
    }

    #[test]
    fn json_numbers_are_epoch_millis() {
        // 2025-05-20T00:00:00Z
        assert_eq!(normalize(&json!(1_747_699_200_000_i64)), Some(d(2025, 5, 20)));
    }

    #[test]
    fn normalize_is_idempotent() {
        let inputs = [
            DateInput::from("2024-02-29"),
            DateInput::from("2025-05-20T10:00:00Z"),
            DateInput::from(d(1999, 12, 31)),
            DateInput::Ymd(2030, 1, 1),
        ];
        for input in inputs {
            let once = normalize(input.clone());
            assert!(once.is_some(), "{input:?} should normalize");
            assert_eq!(normalize(once), once);
        }
    }

    #[test]
    fn same_day_ignores_time_and_rejects_invalid() {
        assert!(same_day("2025-05-20T08:00:00", d(2025, 5, 20)));
        assert!(!same_day("2025-05-20", "2025-05-21"));
        assert!(!same_day("garbage", "garbage"));
        assert!(!same_day(None::<NaiveDate>, d(2025, 5, 20)));
    }

    #[test]
    fn strict_parse_reports_invalid_date() {
        assert_eq!(parse_date("2025-05-20"), Ok(d(2025, 5, 20)));
        assert_eq!(
            parse_date("nope"),
            Err(DateError::InvalidDate("nope".to_string()))
        );
    }

    #[test]
    fn days_between_is_signed() {
        assert_eq!(days_between(d(2025, 5, 20), d(2025, 5, 29)), 9);
        assert_eq!(days_between(d(2025, 5, 29), d(2025, 5, 20)), -9);
        assert_eq!(add_days(d(2025, 5, 31), 1), Some(d(2025, 6, 1)));
        assert_eq!(add_days(d(9999, 12, 31), 1), None);
    }
}
