//! Loose conversions of raw JSON cell values.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

/// True-like values: `true`, `1`, `"1"`, `"true"` (any case).
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() == Some(1.0),
        Value::String(s) => {
            let s = s.trim();
            s == "1" || s.eq_ignore_ascii_case("true")
        }
        _ => false,
    }
}

/// Number from a JSON number or a numeric string.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Render a number without a trailing `.0` for integral values.
pub fn number_text(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// JSON number, integral when possible. Non-finite input becomes `null`.
pub fn json_number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Parse a date/time the way list stores deliver them.
///
/// Accepts RFC 3339, zone-less date-times (taken as UTC), bare dates
/// (midnight UTC) and numbers as epoch milliseconds.
pub fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
        Value::String(s) => parse_datetime_str(s),
        _ => None,
    }
}

pub fn parse_datetime_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// ISO-8601 with milliseconds and a `Z` suffix: `2024-03-01T00:00:00.000Z`.
pub fn iso_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Calendar day of a date value. Bare dates are taken as-is; timestamps
/// are converted to the local day.
pub fn calendar_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    parse_datetime_str(s).map(|dt| dt.with_timezone(&Local).date_naive())
}

/// Plain text of a scalar cell. Arrays and objects have none.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthy_values() {
        for v in [json!(true), json!(1), json!("1"), json!("true"), json!("TRUE")] {
            assert!(is_truthy(&v), "{v}");
        }
        for v in [json!(false), json!(0), json!("0"), json!("no"), json!(null), json!("")] {
            assert!(!is_truthy(&v), "{v}");
        }
    }

    #[test]
    fn dates_render_like_iso_strings() {
        let dt = parse_datetime(&json!("2024-03-01")).unwrap();
        assert_eq!(iso_timestamp(&dt), "2024-03-01T00:00:00.000Z");
        let dt = parse_datetime(&json!("2024-03-01T10:30:00-03:00")).unwrap();
        assert_eq!(iso_timestamp(&dt), "2024-03-01T13:30:00.000Z");
        assert!(parse_datetime(&json!("not a date")).is_none());
    }

    #[test]
    fn numbers_render_without_trailing_zero() {
        assert_eq!(number_text(10.0), "10");
        assert_eq!(number_text(10.5), "10.5");
        assert_eq!(json_number(3.0), json!(3));
    }
}
