//! Content-based log format detection.
//!
//! Operates on the first non-empty line of a source. JSON is the most
//! specific shape and is tried first, then CSV, then the TEXT default.

use serde_json::Value;

use super::csv::split_csv_line;
use crate::model::{LogFormat, LogLevel};

/// True if the line looks like a PostgreSQL jsonlog record: a JSON object
/// with `error_severity` (a recognized level name) and `message` keys.
pub fn is_valid_json_log(line: &str) -> bool {
    let line = line.trim();
    if !line.starts_with('{') {
        return false;
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(_) => return false,
    };

    let Value::Object(map) = value else {
        return false;
    };

    if !map.contains_key("message") {
        return false;
    }

    match map.get("error_severity").and_then(Value::as_str) {
        Some(severity) => LogLevel::is_valid_severity_name(severity),
        None => false,
    }
}

/// True if the line looks like a PostgreSQL csvlog record:
/// 22-26 fields, a `YYYY-MM-DD HH:MM:SS` prefix in field 0 and a
/// recognized level name in field 11.
pub fn is_valid_csv_log(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return false;
    }

    let fields = split_csv_line(line);
    if !(22..=26).contains(&fields.len()) {
        return false;
    }

    let ts = &fields[0];
    if ts.len() < 19 {
        return false;
    }
    let bytes = ts.as_bytes();
    let shape_ok = bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes[10] == b' '
        && bytes[13] == b':'
        && bytes[16] == b':';
    if !shape_ok {
        return false;
    }

    LogLevel::is_valid_severity_name(&fields[11])
}

/// Detect the log format of a single line.
pub fn detect_format(line: &str) -> LogFormat {
    let line = line.trim();
    if line.is_empty() {
        return LogFormat::Text;
    }

    if line.starts_with('{') && is_valid_json_log(line) {
        return LogFormat::Json;
    }

    if is_valid_csv_log(line) {
        return LogFormat::Csv;
    }

    LogFormat::Text
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV_LINE: &str = r#"2024-01-15 10:30:45.123 UTC,"appuser","mydb",12345,"127.0.0.1:5432","6789",1,"SELECT","2024-01-15 10:00:00 UTC","3/0",0,ERROR,23505,"duplicate key value violates unique constraint",,,,,,"SELECT 1",,"src",psql,"client backend",,0"#;

    #[test]
    fn test_detect_json() {
        let line = r#"{"timestamp":"2024-01-15 10:30:45.123 UTC","error_severity":"ERROR","message":"boom"}"#;
        assert_eq!(detect_format(line), LogFormat::Json);
    }

    #[test]
    fn test_detect_json_rejects_non_object() {
        assert_eq!(detect_format("[1, 2, 3]"), LogFormat::Text);
        assert_eq!(detect_format(r#"{"message":"no severity"}"#), LogFormat::Text);
        assert_eq!(
            detect_format(r#"{"error_severity":"NOPE","message":"x"}"#),
            LogFormat::Text
        );
    }

    #[test]
    fn test_detect_csv() {
        assert_eq!(detect_format(CSV_LINE), LogFormat::Csv);
    }

    #[test]
    fn test_detect_csv_rejects_wrong_field_count() {
        assert_eq!(detect_format("a,b,c"), LogFormat::Text);
    }

    #[test]
    fn test_detect_csv_rejects_bad_timestamp() {
        let line = CSV_LINE.replacen("2024-01-15 10:30:45.123 UTC", "not-a-timestamp-atall", 1);
        assert_eq!(detect_format(&line), LogFormat::Text);
    }

    #[test]
    fn test_detect_text_default() {
        assert_eq!(
            detect_format("2024-01-15 10:30:45 UTC [1] LOG:  ready"),
            LogFormat::Text
        );
        assert_eq!(detect_format(""), LogFormat::Text);
    }
}
