//! Default stderr-format parser.
//!
//! Two prefix shapes are accepted:
//! - `2024-01-15 10:30:45.123 UTC [12345] LOG:  message`
//! - `[2024-01-15 10:30:45.123 UTC] [12345] [context] LOG:  message`
//!
//! Anything else becomes a LOG-level fallback record.

use std::sync::OnceLock;

use regex::Regex;

use super::timestamp::normalize_timestamp;
use crate::model::{LogFormat, LogLevel, LogRecord};

fn plain_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}(?:\.\d+)?)\s+(\w+)?\s*\[(\d+)\]\s+(\w+):\s*(.*)$",
        )
        .unwrap()
    })
}

fn bracketed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\[(\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}\.\d+\s+\w+)\]\s+\[(\d+)\]\s+(?:\[[^\]]*\]\s+)?(\w+):\s*(.*)$",
        )
        .unwrap()
    })
}

/// Parse a stderr-format log line. Never fails: unmatched lines become a
/// LOG-level record with only `raw` and `message` populated.
pub fn parse_text_line(line: &str) -> LogRecord {
    let line = line.trim_end_matches(['\n', '\r']);

    if let Some(caps) = plain_re().captures(line) {
        let ts_str = match caps.get(2) {
            Some(tz) => format!("{} {}", &caps[1], tz.as_str()),
            None => caps[1].to_string(),
        };
        return LogRecord {
            timestamp: normalize_timestamp(&ts_str),
            level: LogLevel::from_severity_word(&caps[4]).unwrap_or(LogLevel::Log),
            message: caps[5].to_string(),
            pid: caps[3].parse().ok(),
            ..LogRecord::fallback(line, LogFormat::Text)
        };
    }

    if let Some(caps) = bracketed_re().captures(line) {
        return LogRecord {
            timestamp: normalize_timestamp(&caps[1]),
            level: LogLevel::from_severity_word(&caps[3]).unwrap_or(LogLevel::Log),
            message: caps[4].to_string(),
            pid: caps[2].parse().ok(),
            ..LogRecord::fallback(line, LogFormat::Text)
        };
    }

    LogRecord::fallback(line, LogFormat::Text)
}
