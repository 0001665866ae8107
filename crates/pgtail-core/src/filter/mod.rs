//! Composable record filtering: level sets, a regex matrix, a time window
//! and structured field equality.
//!
//! `FilterSet` is the unit the runtime pushes into sources and the history
//! buffer; it is cheap to clone (compiled regexes are shared) so the anchor
//! snapshot and refilter replay work on plain copies.

mod field;
mod level;
mod regex;
mod time;

pub use field::{FieldFilterState, FieldKey};
pub use level::{parse_level_spec, parse_levels};
pub use regex::{apply_filter_token, parse_filter_arg, FilterKind, RegexFilter, RegexFilterState};
pub use time::{parse_time, TimeFilter, TimeParseError};

use std::collections::HashSet;

use crate::model::{LogLevel, LogRecord};

/// Error for a rejected filter command. Carries the one-line diagnostic
/// surfaced to the UI; prior filter state is left intact by all parsers.
#[derive(Debug, Clone)]
pub struct FilterError {
    pub message: String,
}

impl std::fmt::Display for FilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for FilterError {}

impl FilterError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        FilterError {
            message: message.into(),
        }
    }
}

/// The complete filter state applied to every record.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    /// Levels to show; `None` means all.
    pub levels: Option<HashSet<LogLevel>>,
    pub regex: RegexFilterState,
    pub time: TimeFilter,
    pub fields: FieldFilterState,
}

impl FilterSet {
    /// Decide whether a record is shown.
    ///
    /// Order: time window, level set, field equality, then the regex matrix
    /// over the raw line.
    pub fn should_show(&self, record: &LogRecord) -> bool {
        if !self.time.matches(record) {
            return false;
        }

        if let Some(levels) = &self.levels {
            if !levels.contains(&record.level) {
                return false;
            }
        }

        if !self.fields.matches(record) {
            return false;
        }

        if self.regex.has_filters() && !self.regex.should_show(&record.raw) {
            return false;
        }

        true
    }

    /// True if any constraint is active.
    pub fn is_active(&self) -> bool {
        self.levels.is_some()
            || self.regex.has_filters()
            || self.time.is_active()
            || self.fields.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LogFormat;

    fn record(level: LogLevel, raw: &str) -> LogRecord {
        LogRecord {
            level,
            ..LogRecord::fallback(raw, LogFormat::Text)
        }
    }

    #[test]
    fn test_empty_filter_shows_everything() {
        let filters = FilterSet::default();
        assert!(filters.should_show(&record(LogLevel::Debug5, "anything")));
        assert!(!filters.is_active());
    }

    #[test]
    fn test_level_and_regex_compose() {
        let mut filters = FilterSet::default();
        filters.levels = Some([LogLevel::Error, LogLevel::Warning].into_iter().collect());
        apply_filter_token(&mut filters.regex, "/deadlock/").unwrap();

        assert!(filters.should_show(&record(LogLevel::Error, "deadlock detected")));
        assert!(!filters.should_show(&record(LogLevel::Error, "duplicate key")));
        assert!(!filters.should_show(&record(LogLevel::Log, "deadlock detected")));
    }

    #[test]
    fn test_field_filter_never_matches_text_records() {
        let mut filters = FilterSet::default();
        filters.fields.add("db", "prod").unwrap();
        // TEXT records have no structured fields, so they cannot match.
        assert!(!filters.should_show(&record(LogLevel::Error, "some error")));
    }
}
