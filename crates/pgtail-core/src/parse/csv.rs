//! PostgreSQL csvlog parser.
//!
//! Column order is fixed (26 columns on PG 14+); older versions omit
//! trailing columns. The parser accepts any count >= 14 and treats missing
//! trailing columns and empty strings as absent values.

use super::timestamp::normalize_timestamp;
use super::ParseError;
use crate::model::{LogFormat, LogLevel, LogRecord};

/// Split a CSV line respecting double-quote escaping.
///
/// PostgreSQL csvlog uses standard CSV quoting with `""` for an embedded
/// quote; no external CSV machinery is needed for that.
pub fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    // Escaped quote
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == '"' {
            in_quotes = true;
        } else if c == ',' {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    fields.push(current);

    fields
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn safe_parse<T: std::str::FromStr>(value: &str) -> Option<T> {
    if value.is_empty() {
        None
    } else {
        value.parse().ok()
    }
}

/// Split csvlog's `connection_from` column (`host:port` or `[local]`)
/// into a host and an optional port.
fn split_connection_from(value: &str) -> (Option<String>, Option<u16>) {
    if value.is_empty() {
        return (None, None);
    }
    if let Some((host, port)) = value.rsplit_once(':') {
        if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) {
            return (Some(host.to_string()), port.parse().ok());
        }
    }
    (Some(value.to_string()), None)
}

/// Parse a csvlog line into a record.
///
/// Fails only when the line has fewer than 14 fields (not even a message
/// column); the caller degrades that to a fallback record.
pub fn parse_csv_line(line: &str) -> Result<LogRecord, ParseError> {
    let line = line.trim_end_matches(['\n', '\r']);
    let fields = split_csv_line(line);

    if fields.len() < 14 {
        return Err(ParseError::new(format!(
            "CSV line has {} fields, need at least 14",
            fields.len()
        )));
    }

    let field = |idx: usize| -> &str { fields.get(idx).map_or("", String::as_str) };

    let level = LogLevel::from_severity_word(field(11)).unwrap_or(LogLevel::Log);
    let (remote_host, remote_port) = split_connection_from(field(4));

    Ok(LogRecord {
        timestamp: normalize_timestamp(field(0)),
        level,
        message: field(13).to_string(),
        pid: safe_parse(field(3)),
        user: non_empty(field(1)),
        database: non_empty(field(2)),
        remote_host,
        remote_port,
        session_id: non_empty(field(5)),
        session_line_num: safe_parse(field(6)),
        session_start: normalize_timestamp(field(8)),
        virtual_txid: non_empty(field(9)),
        txid: non_empty(field(10)),
        sql_state: non_empty(field(12)),
        detail: non_empty(field(14)),
        hint: non_empty(field(15)),
        internal_query: non_empty(field(16)),
        internal_query_pos: safe_parse(field(17)),
        context: non_empty(field(18)),
        query: non_empty(field(19)),
        query_pos: safe_parse(field(20)),
        location: non_empty(field(21)),
        application: non_empty(field(22)),
        backend_type: non_empty(field(23)),
        leader_pid: safe_parse(field(24)),
        query_id: safe_parse(field(25)),
        ..LogRecord::fallback(line, LogFormat::Csv)
    })
}
