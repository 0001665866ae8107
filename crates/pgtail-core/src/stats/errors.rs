//! Error statistics: tracks ERROR/FATAL/PANIC/WARNING records with
//! breakdowns by level and SQLSTATE, per-minute trend buckets and a
//! sparkline rendering.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};

use crate::model::{LogLevel, LogRecord};

/// Bound on the retained event history.
const MAX_EVENTS: usize = 10_000;

/// Message prefix length kept per event.
const MESSAGE_PREFIX_LEN: usize = 200;

/// SQLSTATE class (first 2 chars) -> category name.
const SQLSTATE_CATEGORIES: &[(&str, &str)] = &[
    ("00", "Successful Completion"),
    ("01", "Warning"),
    ("02", "No Data"),
    ("03", "SQL Statement Not Yet Complete"),
    ("08", "Connection Exception"),
    ("09", "Triggered Action Exception"),
    ("0A", "Feature Not Supported"),
    ("0B", "Invalid Transaction Initiation"),
    ("0F", "Locator Exception"),
    ("0L", "Invalid Grantor"),
    ("0P", "Invalid Role Specification"),
    ("0Z", "Diagnostics Exception"),
    ("20", "Case Not Found"),
    ("21", "Cardinality Violation"),
    ("22", "Data Exception"),
    ("23", "Integrity Constraint Violation"),
    ("24", "Invalid Cursor State"),
    ("25", "Invalid Transaction State"),
    ("26", "Invalid SQL Statement Name"),
    ("27", "Triggered Data Change Violation"),
    ("28", "Invalid Authorization Specification"),
    ("2B", "Dependent Privilege Descriptors Still Exist"),
    ("2D", "Invalid Transaction Termination"),
    ("2F", "SQL Routine Exception"),
    ("34", "Invalid Cursor Name"),
    ("38", "External Routine Exception"),
    ("39", "External Routine Invocation Exception"),
    ("3B", "Savepoint Exception"),
    ("3D", "Invalid Catalog Name"),
    ("3F", "Invalid Schema Name"),
    ("40", "Transaction Rollback"),
    ("42", "Syntax Error or Access Rule Violation"),
    ("44", "WITH CHECK OPTION Violation"),
    ("53", "Insufficient Resources"),
    ("54", "Program Limit Exceeded"),
    ("55", "Object Not In Prerequisite State"),
    ("57", "Operator Intervention"),
    ("58", "System Error"),
    ("72", "Snapshot Failure"),
    ("F0", "Configuration File Error"),
    ("HV", "Foreign Data Wrapper Error"),
    ("P0", "PL/pgSQL Error"),
    ("XX", "Internal Error"),
];

/// Common SQLSTATE codes with condition names.
const SQLSTATE_NAMES: &[(&str, &str)] = &[
    ("23502", "not_null_violation"),
    ("23503", "foreign_key_violation"),
    ("23505", "unique_violation"),
    ("23514", "check_violation"),
    ("23P01", "exclusion_violation"),
    ("42501", "insufficient_privilege"),
    ("42601", "syntax_error"),
    ("42602", "invalid_name"),
    ("42703", "undefined_column"),
    ("42704", "undefined_object"),
    ("42710", "duplicate_object"),
    ("42P01", "undefined_table"),
    ("42P02", "undefined_parameter"),
    ("53100", "disk_full"),
    ("53200", "out_of_memory"),
    ("53300", "too_many_connections"),
    ("57014", "query_canceled"),
    ("57P01", "admin_shutdown"),
    ("57P02", "crash_shutdown"),
    ("57P03", "cannot_connect_now"),
    ("58030", "io_error"),
    ("40001", "serialization_failure"),
    ("40P01", "deadlock_detected"),
];

/// Human-readable name for a SQLSTATE code; the code itself when unknown.
pub fn sqlstate_name(code: &str) -> &str {
    SQLSTATE_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map_or(code, |(_, name)| *name)
}

/// Category for a SQLSTATE code's 2-char class.
pub fn sqlstate_category(code: &str) -> &'static str {
    if code.len() >= 2 {
        let class = &code[..2];
        if let Some((_, cat)) = SQLSTATE_CATEGORIES.iter().find(|(c, _)| *c == class) {
            return cat;
        }
    }
    "Unknown"
}

/// Unicode block characters for sparklines, increasing height.
const SPARK_CHARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Render values as a sparkline, one character per value.
pub fn sparkline(values: &[u64]) -> String {
    if values.is_empty() {
        return String::new();
    }
    let max = values.iter().copied().max().unwrap_or(0).max(1);
    values
        .iter()
        .map(|&v| {
            let idx = ((v * 7) / max).min(7) as usize;
            SPARK_CHARS[idx]
        })
        .collect()
}

/// A tracked error or warning event.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub sql_state: Option<String>,
    /// First 200 chars of the message.
    pub message: String,
    pub pid: Option<u32>,
    pub database: Option<String>,
    pub user: Option<String>,
}

impl ErrorEvent {
    fn from_record(record: &LogRecord) -> ErrorEvent {
        let mut message = record.message.clone();
        if message.len() > MESSAGE_PREFIX_LEN {
            let cut = (1..=MESSAGE_PREFIX_LEN)
                .rev()
                .find(|&i| message.is_char_boundary(i))
                .unwrap_or(0);
            message.truncate(cut);
        }
        ErrorEvent {
            timestamp: record.timestamp.unwrap_or_else(Utc::now),
            level: record.level,
            sql_state: record.sql_state.clone(),
            message,
            pid: record.pid,
            database: record.database.clone(),
            user: record.user.clone(),
        }
    }
}

/// Session-scoped error statistics aggregator.
#[derive(Debug)]
pub struct ErrorStats {
    events: VecDeque<ErrorEvent>,
    pub session_start: DateTime<Utc>,
    counts_by_level: HashMap<LogLevel, u64>,
    counts_by_code: HashMap<String, u64>,
    pub error_count: u64,
    pub warning_count: u64,
    pub last_error_time: Option<DateTime<Utc>>,
}

impl Default for ErrorStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorStats {
    pub fn new() -> Self {
        ErrorStats {
            events: VecDeque::new(),
            session_start: Utc::now(),
            counts_by_level: HashMap::new(),
            counts_by_code: HashMap::new(),
            error_count: 0,
            warning_count: 0,
            last_error_time: None,
        }
    }

    fn is_tracked(level: LogLevel) -> bool {
        matches!(
            level,
            LogLevel::Panic | LogLevel::Fatal | LogLevel::Error | LogLevel::Warning
        )
    }

    fn is_error(level: LogLevel) -> bool {
        matches!(level, LogLevel::Panic | LogLevel::Fatal | LogLevel::Error)
    }

    /// Track a record if its level is PANIC/FATAL/ERROR/WARNING.
    pub fn add(&mut self, record: &LogRecord) {
        if !Self::is_tracked(record.level) {
            return;
        }

        let event = ErrorEvent::from_record(record);

        *self.counts_by_level.entry(event.level).or_insert(0) += 1;
        let code = event.sql_state.clone().unwrap_or_else(|| "UNKNOWN".to_string());
        *self.counts_by_code.entry(code).or_insert(0) += 1;

        if Self::is_error(event.level) {
            self.error_count += 1;
            self.last_error_time = Some(event.timestamp);
        } else {
            self.warning_count += 1;
        }

        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Reset all statistics.
    pub fn clear(&mut self) {
        self.events.clear();
        self.counts_by_level.clear();
        self.counts_by_code.clear();
        self.error_count = 0;
        self.warning_count = 0;
        self.last_error_time = None;
        self.session_start = Utc::now();
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Running counts by severity level.
    pub fn by_level(&self) -> &HashMap<LogLevel, u64> {
        &self.counts_by_level
    }

    /// Counts by SQLSTATE code, most frequent first.
    pub fn by_code(&self) -> Vec<(String, u64)> {
        let mut counts: Vec<(String, u64)> = self
            .counts_by_code
            .iter()
            .map(|(c, n)| (c.clone(), *n))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts
    }

    /// Events at or after a timestamp, chronological.
    pub fn events_since(&self, since: DateTime<Utc>) -> Vec<&ErrorEvent> {
        self.events.iter().filter(|e| e.timestamp >= since).collect()
    }

    /// Events with a specific SQLSTATE code, chronological.
    pub fn events_by_code(&self, code: &str) -> Vec<&ErrorEvent> {
        self.events
            .iter()
            .filter(|e| e.sql_state.as_deref() == Some(code))
            .collect()
    }

    /// Per-minute event counts over the last `minutes` minutes, oldest
    /// bucket first.
    pub fn trend_buckets(&self, minutes: usize) -> Vec<u64> {
        let now = Utc::now();
        let mut buckets = vec![0u64; minutes];
        let cutoff = now - Duration::minutes(minutes as i64);

        for event in &self.events {
            if event.timestamp < cutoff || event.timestamp > now {
                continue;
            }
            let age_minutes = (now - event.timestamp).num_seconds() / 60;
            let age = age_minutes as usize;
            if age < minutes {
                buckets[minutes - 1 - age] += 1;
            }
        }

        buckets
    }
}
