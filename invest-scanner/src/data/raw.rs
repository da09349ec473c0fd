//! Loosely-typed upstream bar records.
//!
//! Providers disagree on field names, number encodings and time formats.
//! [`RawBar`] accepts all of them and [`RawBar::normalize`] is the single
//! place that turns one into a strongly-typed [`Bar`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::Bar;

/// Epoch values below this are seconds, at or above are milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Failure to turn a raw record into a [`Bar`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarError {
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("invalid value for '{field}': {value}")]
    InvalidField { field: &'static str, value: String },
}

/// A bar record as emitted by an upstream source.
///
/// Numbers may arrive as JSON numbers or numeric strings. Times may be epoch
/// seconds, epoch milliseconds, `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or RFC 3339.
/// When a record carries several spellings of one field, the first non-null
/// spelling in key order wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct RawBar {
    pub time: Option<Value>,
    pub open: Option<Value>,
    pub high: Option<Value>,
    pub low: Option<Value>,
    pub close: Option<Value>,
    pub volume: Option<Value>,
    pub amount: Option<Value>,
}

const TIME_KEYS: &[&str] = &["time", "timestamp", "datetime", "date", "t"];

fn first_present(record: &mut Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter()
        .filter_map(|key| record.remove(*key))
        .find(|value| !value.is_null())
}

impl From<Map<String, Value>> for RawBar {
    fn from(mut record: Map<String, Value>) -> Self {
        Self {
            time: first_present(&mut record, TIME_KEYS),
            open: first_present(&mut record, &["open", "o"]),
            high: first_present(&mut record, &["high", "h"]),
            low: first_present(&mut record, &["low", "l"]),
            close: first_present(&mut record, &["close", "c"]),
            volume: first_present(&mut record, &["volume", "v"]),
            amount: first_present(&mut record, &["amount", "turnover"]),
        }
    }
}

impl RawBar {
    /// Convert into a [`Bar`] for `symbol`.
    pub fn normalize(&self, symbol: &str) -> Result<Bar, BarError> {
        let time = parse_time(required("time", &self.time)?)?;
        let open = parse_price("open", required("open", &self.open)?)?;
        let high = parse_price("high", required("high", &self.high)?)?;
        let low = parse_price("low", required("low", &self.low)?)?;
        let close = parse_price("close", required("close", &self.close)?)?;
        let volume = self.volume()?;

        let mut bar = Bar::new(symbol, time, open, high, low, close, volume);
        if let Some(amount) = self.amount.as_ref().filter(|v| !v.is_null()) {
            bar.amount = parse_price("amount", amount)?;
        }
        Ok(bar)
    }

    /// Parse only the volume field.
    pub fn volume(&self) -> Result<u64, BarError> {
        parse_volume(required("volume", &self.volume)?)
    }
}

fn required<'a>(field: &'static str, value: &'a Option<Value>) -> Result<&'a Value, BarError> {
    match value {
        Some(v) if !v.is_null() => Ok(v),
        _ => Err(BarError::MissingField(field)),
    }
}

fn invalid(field: &'static str, value: &Value) -> BarError {
    BarError::InvalidField {
        field,
        value: value.to_string(),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn parse_price(field: &'static str, value: &Value) -> Result<f64, BarError> {
    as_f64(value)
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(field, value))
}

fn parse_volume(value: &Value) -> Result<u64, BarError> {
    if let Some(v) = value.as_u64() {
        return Ok(v);
    }
    if let Value::String(s) = value {
        if let Ok(v) = s.trim().parse::<u64>() {
            return Ok(v);
        }
    }

    // Some sources report volume as a float ("1234.0")
    match as_f64(value) {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(v as u64),
        _ => Err(invalid("volume", value)),
    }
}

fn epoch_to_datetime(raw: i64) -> Option<DateTime<Utc>> {
    if raw.abs() < MILLIS_THRESHOLD {
        Utc.timestamp_opt(raw, 0).single()
    } else {
        Utc.timestamp_millis_opt(raw).single()
    }
}

fn parse_time(value: &Value) -> Result<DateTime<Utc>, BarError> {
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(epoch_to_datetime),
        Value::String(s) => parse_time_str(s.trim()),
        _ => None,
    };

    parsed.ok_or_else(|| invalid("time", value))
}

fn parse_time_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(raw) = s.parse::<i64>() {
        return epoch_to_datetime(raw);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawBar {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_normalize_script_record() {
        let record = raw(json!({
            "time": 1709251200,
            "timeString": "2024-03-01",
            "open": 0.1, "high": 0.12, "low": 0.09, "close": 0.11,
            "volume": 150000,
            "amount": 16500.0
        }));
        let bar = record.normalize("SNDL").unwrap();
        assert_eq!(bar.symbol, "SNDL");
        assert_eq!(bar.time.timestamp(), 1709251200);
        assert_eq!(bar.volume, 150000);
        assert_eq!(bar.amount, 16500.0);
    }

    #[test]
    fn test_normalize_millis_and_derived_amount() {
        let record = raw(json!({
            "time": 1709251200000i64,
            "open": 1.0, "high": 1.0, "low": 1.0, "close": 2.0,
            "volume": 10
        }));
        let bar = record.normalize("X").unwrap();
        assert_eq!(bar.time.timestamp(), 1709251200);
        assert_eq!(bar.amount, 20.0);
    }

    #[test]
    fn test_normalize_string_numbers_and_dates() {
        let record = raw(json!({
            "datetime": "2024-03-01",
            "open": "0.10", "high": "0.12", "low": "0.09", "close": "0.11",
            "volume": "2500.0"
        }));
        let bar = record.normalize("X").unwrap();
        assert_eq!(bar.time.format("%Y-%m-%d").to_string(), "2024-03-01");
        assert_eq!(bar.open, 0.10);
        assert_eq!(bar.volume, 2500);
    }

    #[test]
    fn test_normalize_datetime_formats() {
        for time in ["2024-03-01 15:30:00", "2024-03-01T15:30:00Z", "1709307000"] {
            let record = raw(json!({
                "time": time,
                "open": 1, "high": 1, "low": 1, "close": 1, "volume": 1
            }));
            let bar = record.normalize("X").unwrap();
            assert_eq!(bar.time.timestamp(), 1709307000, "format {}", time);
        }
    }

    #[test]
    fn test_abbreviated_field_names() {
        let record = raw(json!({"t": 1709251200000i64, "o": 1, "h": 2, "l": 0.5, "c": 1.5, "v": 99}));
        let bar = record.normalize("X").unwrap();
        assert_eq!(bar.high, 2.0);
        assert_eq!(bar.volume, 99);
    }

    #[test]
    fn test_missing_field() {
        let record = raw(json!({"time": 1709251200, "open": 1, "high": 1, "low": 1, "volume": 1}));
        assert_eq!(
            record.normalize("X").unwrap_err(),
            BarError::MissingField("close")
        );
    }

    #[test]
    fn test_malformed_volume() {
        let record = raw(json!({
            "time": 1709251200,
            "open": 1, "high": 1, "low": 1, "close": 1,
            "volume": "n/a"
        }));
        assert!(matches!(
            record.normalize("X"),
            Err(BarError::InvalidField { field: "volume", .. })
        ));
        assert!(record.volume().is_err());
    }

    #[test]
    fn test_negative_volume_rejected() {
        let record = raw(json!({"volume": -5}));
        assert!(record.volume().is_err());
    }

    #[test]
    fn test_null_volume_is_missing() {
        let record = raw(json!({"volume": null}));
        assert_eq!(record.volume().unwrap_err(), BarError::MissingField("volume"));
    }

    #[test]
    fn test_multiple_time_spellings() {
        let record = raw(json!({
            "time": 1709251200,
            "timestamp": "2024-03-05",
            "date": "2024-03-06",
            "open": 1, "o": 9, "high": 1, "low": 1, "close": 1, "volume": 10, "v": 20
        }));
        let bar = record.normalize("X").unwrap();
        assert_eq!(bar.time.timestamp(), 1709251200);
        assert_eq!(bar.open, 1.0);
        assert_eq!(bar.volume, 10);
    }

    #[test]
    fn test_null_spelling_falls_through() {
        let record = raw(json!({
            "time": null,
            "date": "2024-03-01",
            "open": 1, "high": 1, "low": 1, "close": 1, "volume": 1
        }));
        let bar = record.normalize("X").unwrap();
        assert_eq!(bar.time.format("%Y-%m-%d").to_string(), "2024-03-01");
    }
}
