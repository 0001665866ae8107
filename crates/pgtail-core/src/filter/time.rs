//! Time-window filtering.
//!
//! Accepts relative durations (`5m`, `30s`, `2h`, `1d`), `HH:MM[:SS]`
//! (today in the local timezone) and ISO 8601 datetimes with an offset or
//! `Z`. All parsed instants are UTC.

use std::sync::OnceLock;

use chrono::{DateTime, Duration, Local, NaiveDateTime, NaiveTime, TimeZone, Utc};
use regex::Regex;

use crate::model::LogRecord;

/// Error type for time parsing failures.
#[derive(Debug, Clone)]
pub struct TimeParseError {
    pub input: String,
    pub message: String,
}

impl std::fmt::Display for TimeParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse time '{}': {}", self.input, self.message)
    }
}

impl std::error::Error for TimeParseError {}

fn relative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(\d+)([smhd])$").unwrap())
}

fn time_only_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{2}):(\d{2})(?::(\d{2}))?$").unwrap())
}

/// Parse a time specification into a UTC instant.
///
/// | Format | Example | Meaning |
/// |--------|---------|---------|
/// | Relative | `5m`, `2h`, `1d` | that long before now |
/// | Time only | `14:30`, `14:30:45` | today, local timezone |
/// | ISO 8601 | `2024-01-15T14:30:00Z` | offset or `Z` honored |
pub fn parse_time(value: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(TimeParseError {
            input: value.to_string(),
            message: "Time value cannot be empty".to_string(),
        });
    }

    if let Some(caps) = relative_re().captures(value) {
        let amount: i64 = caps[1].parse().map_err(|_| TimeParseError {
            input: value.to_string(),
            message: "Amount out of range".to_string(),
        })?;
        let delta = match caps[2].to_ascii_lowercase().as_str() {
            "s" => Duration::seconds(amount),
            "m" => Duration::minutes(amount),
            "h" => Duration::hours(amount),
            _ => Duration::days(amount),
        };
        return Ok(Utc::now() - delta);
    }

    if let Some(caps) = time_only_re().captures(value) {
        let hour: u32 = caps[1].parse().unwrap_or(99);
        let minute: u32 = caps[2].parse().unwrap_or(99);
        let second: u32 = caps.get(3).map_or(0, |m| m.as_str().parse().unwrap_or(99));
        let time = NaiveTime::from_hms_opt(hour, minute, second).ok_or(TimeParseError {
            input: value.to_string(),
            message: "Hours must be 0-23, minutes and seconds must be 0-59".to_string(),
        })?;
        let today = Local::now().date_naive();
        let local = Local
            .from_local_datetime(&today.and_time(time))
            .single()
            .ok_or(TimeParseError {
                input: value.to_string(),
                message: "Ambiguous local time".to_string(),
            })?;
        return Ok(local.with_timezone(&Utc));
    }

    // ISO 8601 with offset or Z
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    // ISO 8601 without zone: taken as local time
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            if let Some(local) = Local.from_local_datetime(&naive).single() {
                return Ok(local.with_timezone(&Utc));
            }
        }
    }

    Err(TimeParseError {
        input: value.to_string(),
        message: "Supported formats: relative (5m, 30s, 2h, 1d), \
                  time only (14:30, 14:30:45), ISO 8601 (2024-01-15T14:30:00Z)"
            .to_string(),
    })
}

/// A `[since, until]` window over record timestamps.
///
/// Records without a timestamp never pass an active window.
#[derive(Debug, Clone, Default)]
pub struct TimeFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Original user input, kept for status display.
    pub original_input: String,
}

impl TimeFilter {
    pub fn since(dt: DateTime<Utc>, input: &str) -> Self {
        TimeFilter {
            since: Some(dt),
            until: None,
            original_input: input.to_string(),
        }
    }

    pub fn until(dt: DateTime<Utc>, input: &str) -> Self {
        TimeFilter {
            since: None,
            until: Some(dt),
            original_input: input.to_string(),
        }
    }

    /// A bounded window; requires `since < until`.
    pub fn between(
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        input: &str,
    ) -> Result<Self, TimeParseError> {
        if since >= until {
            return Err(TimeParseError {
                input: input.to_string(),
                message: "Start time must be before end time".to_string(),
            });
        }
        Ok(TimeFilter {
            since: Some(since),
            until: Some(until),
            original_input: input.to_string(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.since.is_some() || self.until.is_some()
    }

    /// An upper bound means no future record can pass, so follow-to-newest
    /// is pointless; the runtime uses this to drop out of FOLLOW mode.
    pub fn has_upper_bound(&self) -> bool {
        self.until.is_some()
    }

    pub fn matches(&self, record: &LogRecord) -> bool {
        if !self.is_active() {
            return true;
        }

        let Some(ts) = record.timestamp else {
            return false;
        };

        if let Some(since) = self.since {
            if ts < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if ts > until {
                return false;
            }
        }

        true
    }

    /// Human-readable description of the active window.
    pub fn describe(&self) -> String {
        let fmt = |dt: &DateTime<Utc>| {
            dt.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        };
        match (&self.since, &self.until) {
            (Some(s), Some(u)) => format!("between {} and {}", fmt(s), fmt(u)),
            (Some(s), None) => format!("since {}", fmt(s)),
            (None, Some(u)) => format!("until {}", fmt(u)),
            (None, None) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LogFormat, LogRecord};

    #[test]
    fn test_parse_relative() {
        let now = Utc::now();
        let ts = parse_time("5m").unwrap();
        let delta = (now - ts).num_seconds();
        assert!((298..=302).contains(&delta));

        let ts = parse_time("2h").unwrap();
        let delta = (now - ts).num_seconds();
        assert!((7198..=7202).contains(&delta));

        let ts = parse_time("1d").unwrap();
        let delta = (now - ts).num_seconds();
        assert!((86398..=86402).contains(&delta));
    }

    #[test]
    fn test_parse_iso_with_zone() {
        let ts = parse_time("2024-01-15T14:30:00Z").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-01-15T14:30:00+00:00");

        let ts = parse_time("2024-01-15T14:30:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-01-15T12:30:00+00:00");
    }

    #[test]
    fn test_parse_time_only_is_today() {
        let ts = parse_time("14:30").unwrap();
        let local = ts.with_timezone(&Local);
        assert_eq!(local.date_naive(), Local::now().date_naive());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_time("").is_err());
        assert!(parse_time("yesterday").is_err());
        assert!(parse_time("25:99").is_err());
        assert!(parse_time("5y").is_err());
    }

    #[test]
    fn test_between_requires_order() {
        let a = parse_time("2024-01-15T10:00:00Z").unwrap();
        let b = parse_time("2024-01-15T12:00:00Z").unwrap();
        assert!(TimeFilter::between(a, b, "x").is_ok());
        assert!(TimeFilter::between(b, a, "x").is_err());
        assert!(TimeFilter::between(a, a, "x").is_err());
    }

    #[test]
    fn test_window_matching() {
        let a = parse_time("2024-01-15T10:00:00Z").unwrap();
        let b = parse_time("2024-01-15T12:00:00Z").unwrap();
        let window = TimeFilter::between(a, b, "x").unwrap();

        let mut rec = LogRecord::fallback("line", LogFormat::Text);
        rec.timestamp = Some(parse_time("2024-01-15T11:00:00Z").unwrap());
        assert!(window.matches(&rec));

        rec.timestamp = Some(parse_time("2024-01-15T09:00:00Z").unwrap());
        assert!(!window.matches(&rec));

        rec.timestamp = Some(parse_time("2024-01-15T13:00:00Z").unwrap());
        assert!(!window.matches(&rec));
    }

    #[test]
    fn test_no_timestamp_fails_active_window() {
        let rec = LogRecord::fallback("line", LogFormat::Text);
        let inactive = TimeFilter::default();
        assert!(inactive.matches(&rec));

        let active = TimeFilter::since(Utc::now(), "5m");
        assert!(!active.matches(&rec));
    }
}
