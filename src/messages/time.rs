//! Timestamp parsing
//!
//! Wire timestamps arrive as RFC 3339 strings, naive ISO-8601 strings
//! (interpreted as UTC), or epoch seconds (integer or fractional, as a
//! number or a numeric string).

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

pub type Timestamp = DateTime<Utc>;

/// Parse a textual timestamp
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }

    raw.parse::<f64>().ok().and_then(from_epoch_seconds)
}

/// Parse a JSON timestamp value (string or number)
pub fn timestamp_from_value(value: &Value) -> Option<Timestamp> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n.as_f64().and_then(from_epoch_seconds),
        _ => None,
    }
}

fn from_epoch_seconds(secs: f64) -> Option<Timestamp> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);
    DateTime::from_timestamp(whole as i64, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_rfc3339() {
        let ts = parse_timestamp("2023-11-14T22:13:20Z").unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_parse_naive_iso() {
        let ts = parse_timestamp("2023-11-14T22:13:20.250").unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert_eq!(ts.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_parse_epoch() {
        let ts = parse_timestamp("1700000000").unwrap();
        assert_eq!(ts, Utc.timestamp_opt(1_700_000_000, 0).unwrap());

        let ts = parse_timestamp("1700000000.5").unwrap();
        assert_eq!(ts.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_value_forms() {
        assert_eq!(
            timestamp_from_value(&serde_json::json!(1700000000)).unwrap().timestamp(),
            1_700_000_000
        );
        assert!(timestamp_from_value(&serde_json::json!(null)).is_none());
        assert!(timestamp_from_value(&serde_json::json!("soon")).is_none());
    }
}
