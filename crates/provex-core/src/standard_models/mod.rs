//! # Standard Models
//!
//! Vendor-agnostic command definitions shipped with the core. Each module
//! declares the canonical query and record schemas of one command and a
//! constructor that turns provider bindings into a [`CommandSpec`].
//!
//! | Module | Path |
//! |--------|------|
//! | [`sofr`] | `/fixedincome/rate/sofr` |
//! | [`symbol_map`] | `/regulators/sec/symbol_map` |
//! | [`equity_historical`] | `/equity/price/historical` |
//!
//! [`CommandSpec`]: crate::catalog::CommandSpec

pub mod equity_historical;
pub mod sofr;
pub mod symbol_map;

use serde_json::Value;
use time::{Date, Duration};

use crate::adapter::QueryParams;
use crate::domain::{format_date, today_utc};
use crate::error::CommandError;
use crate::schema::Record;

/// Days looked back when a query omits its start date.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 90;

/// Inclusive calendar range resolved from `start_date` / `end_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: Date,
    pub end: Date,
}

impl DateRange {
    /// Missing end defaults to today, missing start to
    /// [`DEFAULT_LOOKBACK_DAYS`] before the end.
    pub fn from_params(params: &QueryParams) -> Result<Self, CommandError> {
        let end = params.date("end_date")?.unwrap_or_else(today_utc);
        let start = params
            .date("start_date")?
            .unwrap_or_else(|| end - Duration::days(DEFAULT_LOOKBACK_DAYS));
        if start > end {
            return Err(CommandError::invalid_option(format!(
                "start_date {} is after end_date {}",
                format_date(start),
                format_date(end)
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn start_str(&self) -> String {
        format_date(self.start)
    }

    pub fn end_str(&self) -> String {
        format_date(self.end)
    }
}

fn date_key(record: &Record) -> &str {
    record.get("date").and_then(Value::as_str).unwrap_or_default()
}

/// Keep records whose `date` falls inside the requested range, oldest first.
///
/// Dates are compared on their `YYYY-MM-DD` prefix so intraday timestamps
/// are kept for every day of the range. Ties keep provider order.
pub(crate) fn clip_to_range(params: &QueryParams, mut records: Vec<Record>) -> Vec<Record> {
    if let Ok(range) = DateRange::from_params(params) {
        let (start, end) = (range.start_str(), range.end_str());
        records.retain(|record| {
            let day = date_key(record).get(..10).unwrap_or_default();
            day >= start.as_str() && day <= end.as_str()
        });
    }
    records.sort_by(|left, right| date_key(left).cmp(date_key(right)));
    records
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::Params;

    fn params(value: Value) -> QueryParams {
        match value {
            Value::Object(map) => QueryParams::new("/x", map, Params::new()),
            _ => panic!("params must be an object"),
        }
    }

    #[test]
    fn missing_start_defaults_to_lookback_window() {
        let range = DateRange::from_params(&params(json!({"end_date": "2024-03-31"})))
            .expect("valid range");
        assert_eq!(range.start_str(), "2024-01-01");
        assert_eq!(range.end_str(), "2024-03-31");
    }

    #[test]
    fn inverted_range_is_rejected() {
        let error = DateRange::from_params(&params(
            json!({"start_date": "2024-02-01", "end_date": "2024-01-01"}),
        ))
        .expect_err("start after end");
        assert!(matches!(error, CommandError::InvalidOption(_)));
    }

    #[test]
    fn clipping_is_inclusive_and_sorted() {
        let records: Vec<Record> = ["2024-01-04", "2023-12-29", "2024-01-02", "2024-01-03T15:30:00Z"]
            .into_iter()
            .map(|date| {
                let mut record = Record::new();
                record.insert(String::from("date"), json!(date));
                record
            })
            .collect();
        let clipped = clip_to_range(
            &params(json!({"start_date": "2024-01-02", "end_date": "2024-01-03"})),
            records,
        );
        let dates: Vec<&str> = clipped.iter().map(date_key).collect();
        assert_eq!(dates, vec!["2024-01-02", "2024-01-03T15:30:00Z"]);
    }
}
