//! Timestamp normalization shared by all parsers.
//!
//! PostgreSQL writes timestamps either in its own `log_timezone` form
//! (`2024-01-15 10:30:45.123 PST`) or in ISO 8601 with a `Z` suffix or a
//! numeric offset. All outputs here are UTC-normalized.

use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use tracing::debug;

/// Common timezone abbreviation offsets, in minutes from UTC.
const TZ_OFFSETS: &[(&str, i32)] = &[
    ("UTC", 0),
    ("GMT", 0),
    ("Z", 0),
    // US timezones
    ("EST", -5 * 60),
    ("EDT", -4 * 60),
    ("CST", -6 * 60),
    ("CDT", -5 * 60),
    ("MST", -7 * 60),
    ("MDT", -6 * 60),
    ("PST", -8 * 60),
    ("PDT", -7 * 60),
    ("AKST", -9 * 60),
    ("AKDT", -8 * 60),
    ("HST", -10 * 60),
    // European timezones
    ("WET", 0),
    ("WEST", 60),
    ("CET", 60),
    ("CEST", 2 * 60),
    ("EET", 2 * 60),
    ("EEST", 3 * 60),
    // Other common timezones
    ("JST", 9 * 60),
    ("KST", 9 * 60),
    ("IST", 5 * 60),
    ("AEST", 10 * 60),
    ("AEDT", 11 * 60),
    ("NZST", 12 * 60),
    ("NZDT", 13 * 60),
];

fn iso_offset_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([+-])(\d{2}):?(\d{2})?$").unwrap())
}

fn iso_separator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\dT\d").unwrap())
}

/// Parse a timestamp string into a UTC instant.
///
/// Accepted shapes:
/// - `YYYY-MM-DD HH:MM:SS[.fff] ABBR`: the abbreviation is resolved
///   against a fixed table; unknown alphabetic abbreviations assume UTC.
/// - `YYYY-MM-DDTHH:MM:SS[.fff]Z`
/// - `YYYY-MM-DDTHH:MM:SS[.fff]±HH[:MM]`
///
/// Returns `None` on any parse failure. Timestamps with no zone
/// information at all are taken as UTC.
pub fn normalize_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    let mut ts = ts.trim();
    if ts.is_empty() {
        return None;
    }

    let is_iso = iso_separator_re().is_match(ts);
    let mut offset_minutes: Option<i32> = None;

    if is_iso && ts.ends_with('Z') {
        ts = &ts[..ts.len() - 1];
        offset_minutes = Some(0);
    } else if is_iso || iso_offset_re().is_match(ts) {
        if let Some(caps) = iso_offset_re().captures(ts) {
            let sign = if &caps[1] == "+" { 1 } else { -1 };
            let hours: i32 = caps[2].parse().ok()?;
            let minutes: i32 = caps.get(3).map_or(0, |m| m.as_str().parse().unwrap_or(0));
            offset_minutes = Some(sign * (hours * 60 + minutes));
            let start = caps.get(0).map(|m| m.start())?;
            ts = ts[..start].trim_end();
        }
    } else if let Some((head, tail)) = ts.rsplit_once(' ') {
        if tail.len() <= 5 {
            let upper = tail.to_ascii_uppercase();
            if let Some((_, mins)) = TZ_OFFSETS.iter().find(|(name, _)| *name == upper) {
                offset_minutes = Some(*mins);
                ts = head.trim_end();
            } else if tail.chars().all(|c| c.is_ascii_alphabetic()) {
                debug!(abbrev = tail, "unknown timezone abbreviation, assuming UTC");
                offset_minutes = Some(0);
                ts = head.trim_end();
            }
        }
    }

    let stripped = ts.replace('T', " ");

    let naive = if stripped.contains('.') {
        NaiveDateTime::parse_from_str(&stripped, "%Y-%m-%d %H:%M:%S%.f").ok()?
    } else {
        NaiveDateTime::parse_from_str(&stripped, "%Y-%m-%d %H:%M:%S").ok()?
    };

    match offset_minutes {
        Some(mins) => {
            let offset = FixedOffset::east_opt(mins * 60)?;
            let local = offset.from_local_datetime(&naive).single()?;
            Some(local.with_timezone(&Utc))
        }
        // No zone information: take the instant as UTC.
        None => Some(Utc.from_utc_datetime(&naive)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_utc_abbreviation() {
        let dt = normalize_timestamp("2024-01-15 10:30:45.123 UTC").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-01-15T10:30:45.123+00:00");
    }

    #[test]
    fn test_named_timezone_pst() {
        let dt = normalize_timestamp("2024-01-15 10:30:45.123 PST").unwrap();
        // PST is UTC-8
        assert_eq!(dt.hour(), 18);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn test_unknown_abbreviation_assumes_utc() {
        let dt = normalize_timestamp("2024-01-15 10:30:45 XYZT").unwrap();
        assert_eq!(dt.hour(), 10);
    }

    #[test]
    fn test_iso_with_z() {
        let dt = normalize_timestamp("2024-01-15T10:30:45.123Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-01-15T10:30:45.123+00:00");
    }

    #[test]
    fn test_iso_with_offset() {
        let dt = normalize_timestamp("2024-01-15 10:30:45.123+02").unwrap();
        assert_eq!(dt.hour(), 8);
        let dt = normalize_timestamp("2024-01-15T10:30:45-05:30").unwrap();
        assert_eq!(dt.hour(), 16);
        assert_eq!(dt.minute(), 0);
    }

    #[test]
    fn test_no_zone_taken_as_utc() {
        let dt = normalize_timestamp("2024-01-15 10:30:45").unwrap();
        assert_eq!(dt.hour(), 10);
    }

    #[test]
    fn test_unparseable() {
        assert!(normalize_timestamp("").is_none());
        assert!(normalize_timestamp("not a timestamp").is_none());
        assert!(normalize_timestamp("2024-99-99 10:30:45").is_none());
    }

    #[test]
    fn test_normalization_idempotent() {
        // Round-tripping through UTC normalization keeps the instant.
        let dt = normalize_timestamp("2024-06-01 00:15:00.500 PDT").unwrap();
        let again =
            normalize_timestamp(&dt.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string()).unwrap();
        assert_eq!(dt, again);
    }
}
