//! PostgreSQL jsonlog parser (PG 15+).
//!
//! One JSON object per line. The key mapping is fixed: `dbname` feeds the
//! `database` field, `state_code` feeds `sql_state`, `statement` feeds
//! `query`, and the `func_name`/`file_name`/`file_line_num` triple is
//! composed into the same `location` string csvlog writes.

use serde_json::{Map, Value};

use super::timestamp::normalize_timestamp;
use super::ParseError;
use crate::model::{LogFormat, LogLevel, LogRecord};

fn get_str(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

fn get_num<T>(map: &Map<String, Value>, key: &str) -> Option<T>
where
    T: TryFrom<i64> + std::str::FromStr,
{
    match map.get(key)? {
        Value::Number(n) => n.as_i64().and_then(|v| T::try_from(v).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Compose the csvlog-style location string from the jsonlog keys.
fn compose_location(map: &Map<String, Value>) -> Option<String> {
    let func = get_str(map, "func_name");
    let file = get_str(map, "file_name");
    let line: Option<i64> = get_num(map, "file_line_num");

    let file_part = file.map(|f| match line {
        Some(n) => format!("{f}:{n}"),
        None => f,
    });

    match (func, file_part) {
        (Some(func), Some(file)) => Some(format!("{func}, {file}")),
        (Some(func), None) => Some(func),
        (None, Some(file)) => Some(file),
        (None, None) => None,
    }
}

/// Parse a jsonlog line into a record.
///
/// Fails when the line is not valid JSON or is not an object; the caller
/// degrades that to a fallback record.
pub fn parse_json_line(line: &str) -> Result<LogRecord, ParseError> {
    let line = line.trim_end_matches(['\n', '\r']);

    let value: Value = serde_json::from_str(line)
        .map_err(|e| ParseError::new(format!("invalid JSON: {e}")))?;

    let Value::Object(map) = value else {
        return Err(ParseError::new("JSON log entry must be an object"));
    };

    let level = map
        .get("error_severity")
        .and_then(Value::as_str)
        .and_then(LogLevel::from_severity_word)
        .unwrap_or(LogLevel::Log);

    let message = get_str(&map, "message").unwrap_or_default();

    Ok(LogRecord {
        timestamp: get_str(&map, "timestamp")
            .as_deref()
            .and_then(normalize_timestamp),
        level,
        message,
        pid: get_num(&map, "pid"),
        user: get_str(&map, "user"),
        database: get_str(&map, "dbname"),
        application: get_str(&map, "application_name"),
        remote_host: get_str(&map, "remote_host"),
        remote_port: get_num(&map, "remote_port"),
        session_id: get_str(&map, "session_id"),
        session_line_num: get_num(&map, "line_num"),
        session_start: get_str(&map, "session_start")
            .as_deref()
            .and_then(normalize_timestamp),
        virtual_txid: get_str(&map, "vxid"),
        txid: get_str(&map, "txid"),
        sql_state: get_str(&map, "state_code"),
        detail: get_str(&map, "detail"),
        hint: get_str(&map, "hint"),
        internal_query: get_str(&map, "internal_query"),
        internal_query_pos: get_num(&map, "internal_position"),
        context: get_str(&map, "context"),
        query: get_str(&map, "statement"),
        query_pos: get_num(&map, "cursor_position"),
        location: compose_location(&map),
        backend_type: get_str(&map, "backend_type"),
        leader_pid: get_num(&map, "leader_pid"),
        query_id: get_num(&map, "query_id"),
        ..LogRecord::fallback(line, LogFormat::Json)
    })
}
