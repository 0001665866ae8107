//! Structured field equality filters (`db=prod`, `app=psql`, ...).
//!
//! Only CSV/JSON records carry the structured fields, so these filters can
//! never match TEXT records; the runtime warns about that once.

use std::collections::BTreeMap;
use std::fmt;

use super::FilterError;
use crate::model::LogRecord;

/// Canonical structured fields usable in equality filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldKey {
    Application,
    Database,
    User,
    Pid,
    Backend,
    Host,
}

/// Alias -> canonical key table, matched case-insensitively.
const FIELD_ALIASES: &[(&str, FieldKey)] = &[
    ("app", FieldKey::Application),
    ("application", FieldKey::Application),
    ("db", FieldKey::Database),
    ("database", FieldKey::Database),
    ("user", FieldKey::User),
    ("pid", FieldKey::Pid),
    ("backend", FieldKey::Backend),
    ("host", FieldKey::Host),
    ("ip", FieldKey::Host),
    ("client", FieldKey::Host),
    ("connection_from", FieldKey::Host),
];

impl FieldKey {
    /// Resolve a field name or alias, case-insensitively.
    pub fn resolve(name: &str) -> Result<FieldKey, FilterError> {
        let lower = name.to_ascii_lowercase();
        FIELD_ALIASES
            .iter()
            .find(|(alias, _)| *alias == lower)
            .map(|(_, key)| *key)
            .ok_or_else(|| {
                let mut valid: Vec<&str> = FIELD_ALIASES.iter().map(|(a, _)| *a).collect();
                valid.sort_unstable();
                FilterError::new(format!(
                    "Unknown field: {name}. Valid fields: {}",
                    valid.join(", ")
                ))
            })
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldKey::Application => "application",
            FieldKey::Database => "database",
            FieldKey::User => "user",
            FieldKey::Pid => "pid",
            FieldKey::Backend => "backend",
            FieldKey::Host => "host",
        }
    }

    /// Extract the field's value from a record for comparison.
    fn extract(self, record: &LogRecord) -> Option<String> {
        match self {
            FieldKey::Application => record.application.clone(),
            FieldKey::Database => record.database.clone(),
            FieldKey::User => record.user.clone(),
            FieldKey::Pid => record.pid.map(|p| p.to_string()),
            FieldKey::Backend => record.backend_type.clone(),
            FieldKey::Host => record.remote_host.clone(),
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Active field filters, ANDed together. At most one filter per field;
/// adding again replaces the value.
#[derive(Debug, Clone, Default)]
pub struct FieldFilterState {
    filters: BTreeMap<FieldKey, String>,
}

impl FieldFilterState {
    /// Add or update a filter. The field name may be an alias.
    pub fn add(&mut self, field: &str, value: &str) -> Result<(), FilterError> {
        let key = FieldKey::resolve(field)?;
        self.filters.insert(key, value.to_string());
        Ok(())
    }

    /// Parse and apply a `field=value` token.
    pub fn add_spec(&mut self, spec: &str) -> Result<(), FilterError> {
        let Some((field, value)) = spec.split_once('=') else {
            return Err(FilterError::new(format!(
                "Field filter must be field=value: {spec}"
            )));
        };
        if value.is_empty() {
            return Err(FilterError::new(format!(
                "Field filter value cannot be empty: {spec}"
            )));
        }
        self.add(field.trim(), value.trim())
    }

    /// Remove the filter for a field. Returns whether one existed.
    pub fn remove(&mut self, field: &str) -> bool {
        match FieldKey::resolve(field) {
            Ok(key) => self.filters.remove(&key).is_some(),
            Err(_) => false,
        }
    }

    pub fn clear(&mut self) {
        self.filters.clear();
    }

    pub fn is_active(&self) -> bool {
        !self.filters.is_empty()
    }

    /// All filters must hold. Values compare case-insensitively; a record
    /// missing the field never matches.
    pub fn matches(&self, record: &LogRecord) -> bool {
        self.filters.iter().all(|(key, wanted)| {
            key.extract(record)
                .is_some_and(|value| value.eq_ignore_ascii_case(wanted))
        })
    }

    /// Active filters as `(field, value)` pairs for status display.
    pub fn active(&self) -> Vec<(FieldKey, &str)> {
        self.filters.iter().map(|(k, v)| (*k, v.as_str())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LogFormat, LogRecord};

    fn csv_record() -> LogRecord {
        LogRecord {
            application: Some("psql".to_string()),
            database: Some("Prod".to_string()),
            user: Some("alice".to_string()),
            pid: Some(4242),
            remote_host: Some("10.0.0.1".to_string()),
            ..LogRecord::fallback("line", LogFormat::Csv)
        }
    }

    #[test]
    fn test_alias_resolution() {
        assert_eq!(FieldKey::resolve("app").unwrap(), FieldKey::Application);
        assert_eq!(FieldKey::resolve("DB").unwrap(), FieldKey::Database);
        assert_eq!(FieldKey::resolve("client").unwrap(), FieldKey::Host);
        assert!(FieldKey::resolve("nope").is_err());
    }

    #[test]
    fn test_value_match_case_insensitive() {
        let mut state = FieldFilterState::default();
        state.add("db", "prod").unwrap();
        assert!(state.matches(&csv_record()));

        state.add("db", "other").unwrap();
        assert!(!state.matches(&csv_record()));
    }

    #[test]
    fn test_multiple_filters_are_anded() {
        let mut state = FieldFilterState::default();
        state.add("db", "prod").unwrap();
        state.add("user", "alice").unwrap();
        assert!(state.matches(&csv_record()));

        state.add("app", "pgbench").unwrap();
        assert!(!state.matches(&csv_record()));
    }

    #[test]
    fn test_pid_compares_textually() {
        let mut state = FieldFilterState::default();
        state.add("pid", "4242").unwrap();
        assert!(state.matches(&csv_record()));
    }

    #[test]
    fn test_text_record_never_matches() {
        let mut state = FieldFilterState::default();
        state.add("db", "prod").unwrap();
        let text = LogRecord::fallback("line", LogFormat::Text);
        assert!(!state.matches(&text));
    }

    #[test]
    fn test_add_spec_parsing() {
        let mut state = FieldFilterState::default();
        state.add_spec("app=psql").unwrap();
        assert!(state.is_active());
        assert!(state.add_spec("no-equals").is_err());
        assert!(state.add_spec("app=").is_err());
    }

    #[test]
    fn test_remove() {
        let mut state = FieldFilterState::default();
        state.add("db", "prod").unwrap();
        assert!(state.remove("database"));
        assert!(!state.remove("database"));
        assert!(!state.is_active());
    }
}
