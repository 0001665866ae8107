//! Core data model: log severity levels, on-disk formats and the uniform
//! parsed record all downstream stages operate on.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// PostgreSQL log severity levels.
///
/// Lower discriminants are more severe. The derived `Ord` therefore sorts
/// `PANIC` first and `DEBUG5` last, which is what level-threshold filtering
/// relies on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum LogLevel {
    Panic,
    Fatal,
    Error,
    Warning,
    Notice,
    Log,
    Info,
    Debug1,
    Debug2,
    Debug3,
    Debug4,
    Debug5,
}

/// Abbreviations accepted anywhere a level name is parsed.
const LEVEL_ALIASES: &[(&str, LogLevel)] = &[
    ("ERR", LogLevel::Error),
    ("WARN", LogLevel::Warning),
    ("INF", LogLevel::Info),
    ("DBG", LogLevel::Debug1),
    ("DEBUG", LogLevel::Debug1),
    ("FAT", LogLevel::Fatal),
    ("PAN", LogLevel::Panic),
    ("NOT", LogLevel::Notice),
    ("NTC", LogLevel::Notice),
    ("E", LogLevel::Error),
    ("W", LogLevel::Warning),
    ("I", LogLevel::Info),
    ("L", LogLevel::Log),
    ("D", LogLevel::Debug1),
    ("F", LogLevel::Fatal),
    ("P", LogLevel::Panic),
    ("N", LogLevel::Notice),
];

impl LogLevel {
    /// All levels, most severe first.
    pub const ALL: [LogLevel; 12] = [
        LogLevel::Panic,
        LogLevel::Fatal,
        LogLevel::Error,
        LogLevel::Warning,
        LogLevel::Notice,
        LogLevel::Log,
        LogLevel::Info,
        LogLevel::Debug1,
        LogLevel::Debug2,
        LogLevel::Debug3,
        LogLevel::Debug4,
        LogLevel::Debug5,
    ];

    /// Canonical upper-case name as it appears in log files.
    pub fn name(self) -> &'static str {
        match self {
            LogLevel::Panic => "PANIC",
            LogLevel::Fatal => "FATAL",
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARNING",
            LogLevel::Notice => "NOTICE",
            LogLevel::Log => "LOG",
            LogLevel::Info => "INFO",
            LogLevel::Debug1 => "DEBUG1",
            LogLevel::Debug2 => "DEBUG2",
            LogLevel::Debug3 => "DEBUG3",
            LogLevel::Debug4 => "DEBUG4",
            LogLevel::Debug5 => "DEBUG5",
        }
    }

    /// All levels at or above the given severity (threshold included).
    pub fn at_or_above(threshold: LogLevel) -> impl Iterator<Item = LogLevel> {
        Self::ALL.into_iter().filter(move |l| *l <= threshold)
    }

    /// All levels at or below the given severity (threshold included).
    pub fn at_or_below(threshold: LogLevel) -> impl Iterator<Item = LogLevel> {
        Self::ALL.into_iter().filter(move |l| *l >= threshold)
    }

    /// Map a severity word from a log line to a level. Unlike `from_str`,
    /// this accepts the continuation keywords PostgreSQL emits (STATEMENT,
    /// DETAIL, HINT, CONTEXT) and maps them to LOG.
    pub fn from_severity_word(word: &str) -> Option<LogLevel> {
        let upper = word.to_ascii_uppercase();
        match upper.as_str() {
            "STATEMENT" | "DETAIL" | "HINT" | "CONTEXT" => return Some(LogLevel::Log),
            "DEBUG" => return Some(LogLevel::Debug1),
            _ => {}
        }
        Self::ALL.into_iter().find(|l| l.name() == upper)
    }

    /// True for a name PostgreSQL itself writes as `error_severity`.
    pub fn is_valid_severity_name(word: &str) -> bool {
        Self::from_severity_word(word).is_some()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for an unrecognized level name or abbreviation.
#[derive(Debug, Clone)]
pub struct LevelParseError {
    pub input: String,
}

impl fmt::Display for LevelParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let valid: Vec<&str> = LogLevel::ALL.iter().map(|l| l.name()).collect();
        write!(
            f,
            "Unknown log level '{}'. Valid levels: {}",
            self.input,
            valid.join(", ")
        )
    }
}

impl std::error::Error for LevelParseError {}

impl FromStr for LogLevel {
    type Err = LevelParseError;

    /// Parse a level from its full name or a common abbreviation,
    /// case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        if let Some((_, level)) = LEVEL_ALIASES.iter().find(|(alias, _)| *alias == upper) {
            return Ok(*level);
        }
        LogLevel::ALL
            .into_iter()
            .find(|l| l.name() == upper)
            .ok_or(LevelParseError {
                input: s.to_string(),
            })
    }
}

/// On-disk log format that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    /// Default stderr format.
    Text,
    /// csvlog format (26 columns on PG 14+).
    Csv,
    /// jsonlog format (PG 15+).
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogFormat::Text => "text",
            LogFormat::Csv => "csv",
            LogFormat::Json => "json",
        };
        f.write_str(name)
    }
}

/// A parsed log line in the canonical form consumed by filters, stats,
/// notifications and the history buffer.
///
/// TEXT sources populate only the core fields; CSV/JSON sources fill the
/// structured fields where the source provides them. `raw` is always the
/// original line, preserved verbatim for display and regex matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// UTC-normalized timestamp; absent on continuation or corrupt lines.
    pub timestamp: Option<DateTime<Utc>>,
    pub level: LogLevel,
    pub message: String,
    /// Original line, never empty after parsing.
    pub raw: String,
    pub pid: Option<u32>,
    /// Which parser produced this record.
    pub format: LogFormat,
    /// Basename of the file, `"stdin"`, or `None`.
    pub source_name: Option<String>,

    // Structured fields (CSV/JSON only).
    pub user: Option<String>,
    pub database: Option<String>,
    pub application: Option<String>,
    pub remote_host: Option<String>,
    pub remote_port: Option<u16>,
    pub session_id: Option<String>,
    pub session_line_num: Option<u64>,
    pub session_start: Option<DateTime<Utc>>,
    pub virtual_txid: Option<String>,
    pub txid: Option<String>,
    pub sql_state: Option<String>,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub internal_query: Option<String>,
    pub internal_query_pos: Option<u32>,
    pub context: Option<String>,
    pub query: Option<String>,
    pub query_pos: Option<u32>,
    pub location: Option<String>,
    pub backend_type: Option<String>,
    pub leader_pid: Option<u32>,
    pub query_id: Option<i64>,
}

impl LogRecord {
    /// Fallback record for a line no grammar matched: LOG level, no
    /// timestamp, the raw line carried through as the message.
    pub fn fallback(line: &str, format: LogFormat) -> Self {
        LogRecord {
            timestamp: None,
            level: LogLevel::Log,
            message: line.to_string(),
            raw: line.to_string(),
            pid: None,
            format,
            source_name: None,
            user: None,
            database: None,
            application: None,
            remote_host: None,
            remote_port: None,
            session_id: None,
            session_line_num: None,
            session_start: None,
            virtual_txid: None,
            txid: None,
            sql_state: None,
            detail: None,
            hint: None,
            internal_query: None,
            internal_query_pos: None,
            context: None,
            query: None,
            query_pos: None,
            location: None,
            backend_type: None,
            leader_pid: None,
            query_id: None,
        }
    }
}

/// A discovered PostgreSQL instance, supplied by the external discovery
/// collaborator. The core consumes `log_path` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub data_dir: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    pub version: Option<String>,
    pub port: Option<u16>,
    pub running: bool,
    /// How the instance was found (e.g. "process-scan").
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_severity_ordering() {
        assert!(LogLevel::Panic < LogLevel::Fatal);
        assert!(LogLevel::Error < LogLevel::Warning);
        assert!(LogLevel::Log < LogLevel::Info);
        assert!(LogLevel::Debug1 < LogLevel::Debug5);
    }

    #[test]
    fn test_level_from_str_names() {
        assert_eq!("ERROR".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert_eq!("error".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert_eq!("Debug3".parse::<LogLevel>().unwrap(), LogLevel::Debug3);
        assert!("BOGUS".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_level_from_str_aliases() {
        assert_eq!("err".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("e".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert_eq!("W".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("dbg".parse::<LogLevel>().unwrap(), LogLevel::Debug1);
        assert_eq!("n".parse::<LogLevel>().unwrap(), LogLevel::Notice);
    }

    #[test]
    fn test_at_or_above() {
        let levels: Vec<LogLevel> = LogLevel::at_or_above(LogLevel::Warning).collect();
        assert_eq!(
            levels,
            vec![
                LogLevel::Panic,
                LogLevel::Fatal,
                LogLevel::Error,
                LogLevel::Warning
            ]
        );
    }

    #[test]
    fn test_at_or_below() {
        let levels: Vec<LogLevel> = LogLevel::at_or_below(LogLevel::Info).collect();
        assert!(levels.contains(&LogLevel::Info));
        assert!(levels.contains(&LogLevel::Debug5));
        assert!(!levels.contains(&LogLevel::Log));
    }

    #[test]
    fn test_severity_word_continuations() {
        assert_eq!(
            LogLevel::from_severity_word("STATEMENT"),
            Some(LogLevel::Log)
        );
        assert_eq!(LogLevel::from_severity_word("DETAIL"), Some(LogLevel::Log));
        assert_eq!(
            LogLevel::from_severity_word("DEBUG"),
            Some(LogLevel::Debug1)
        );
        assert_eq!(LogLevel::from_severity_word("nonsense"), None);
    }

    #[test]
    fn test_fallback_record() {
        let rec = LogRecord::fallback("garbage line", LogFormat::Text);
        assert_eq!(rec.level, LogLevel::Log);
        assert_eq!(rec.message, "garbage line");
        assert_eq!(rec.raw, "garbage line");
        assert!(rec.timestamp.is_none());
        assert!(rec.sql_state.is_none());
    }
}
