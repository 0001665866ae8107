//! Format detection and log line parsing.
//!
//! A source detects its format once (from the first non-empty line) and
//! then parses every line with the matching parser. Lines that defeat the
//! grammar never fail the pipeline: they degrade to a LOG-level fallback
//! record carrying the raw line.

mod csv;
mod detector;
mod json;
mod text;
mod timestamp;

pub use csv::{parse_csv_line, split_csv_line};
pub use detector::{detect_format, is_valid_csv_log, is_valid_json_log};
pub use json::parse_json_line;
pub use text::parse_text_line;
pub use timestamp::normalize_timestamp;

use crate::model::{LogFormat, LogRecord};

/// Parse one line with the parser for `format`.
///
/// CSV and JSON grammar failures fall back to a LOG-level record with the
/// raw line as the message, per the pipeline's no-fatal-errors policy.
pub fn parse_line(line: &str, format: LogFormat) -> LogRecord {
    let line = line.trim_end_matches(['\n', '\r']);
    match format {
        LogFormat::Text => parse_text_line(line),
        LogFormat::Csv => {
            parse_csv_line(line).unwrap_or_else(|_| LogRecord::fallback(line, LogFormat::Csv))
        }
        LogFormat::Json => {
            parse_json_line(line).unwrap_or_else(|_| LogRecord::fallback(line, LogFormat::Json))
        }
    }
}

/// Error for a line that cannot be parsed by a structured-format grammar.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ParseError {}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LogLevel;

    #[test]
    fn test_parse_line_dispatch_text() {
        let rec = parse_line(
            "2024-01-15 10:30:45.123 UTC [12345] ERROR:  duplicate key",
            LogFormat::Text,
        );
        assert_eq!(rec.format, LogFormat::Text);
        assert_eq!(rec.level, LogLevel::Error);
    }

    #[test]
    fn test_parse_line_bad_json_falls_back() {
        let rec = parse_line("{not json at all", LogFormat::Json);
        assert_eq!(rec.format, LogFormat::Json);
        assert_eq!(rec.level, LogLevel::Log);
        assert_eq!(rec.message, "{not json at all");
        assert!(rec.timestamp.is_none());
    }

    #[test]
    fn test_parse_line_strips_newline() {
        let rec = parse_line("plain line\n", LogFormat::Text);
        assert_eq!(rec.raw, "plain line");
    }
}
