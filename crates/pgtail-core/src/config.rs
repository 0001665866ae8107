//! Session configuration from a flat key-value map.
//!
//! An external loader owns file discovery and parsing; the core receives
//! plain `key -> value` strings, validates the recognized keys and builds
//! the initial session state. Bad keys or values produce one-line
//! diagnostics and leave the affected default untouched.

use std::collections::{HashMap, HashSet};

use crate::filter::parse_level_spec;
use crate::model::LogLevel;
use crate::notify::{NotificationConfig, NotificationRule, QuietHours};
use crate::stats::SlowQueryConfig;

/// Initial session state assembled from configuration.
#[derive(Debug, Clone)]
pub struct SessionDefaults {
    /// Initial level filter; `None` means all levels.
    pub levels: Option<HashSet<LogLevel>>,
    /// Whether new sessions start in FOLLOW mode.
    pub follow: bool,
    /// Duration-highlighter thresholds.
    pub slow: SlowQueryConfig,
    /// Per-highlighter enable overrides, as `(name, enabled)`.
    pub enabled_highlighters: Vec<(String, bool)>,
    /// Notification rules and settings.
    pub notifications: NotificationConfig,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        SessionDefaults {
            levels: None,
            follow: true,
            slow: SlowQueryConfig::default(),
            enabled_highlighters: Vec::new(),
            notifications: NotificationConfig::default(),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a config pattern entry: `/regex/` (case-sensitive) or
/// `/regex/i` (case-insensitive).
fn parse_config_pattern(entry: &str) -> Result<NotificationRule, String> {
    let entry = entry.trim();
    if !entry.starts_with('/') {
        return Err(format!("Pattern must be /regex/ or /regex/i: {entry}"));
    }

    let (inner, case_sensitive) = if let Some(stripped) = entry.strip_suffix("/i") {
        (&stripped[1..], false)
    } else if let Some(stripped) = entry.strip_suffix('/') {
        (&stripped[1..], true)
    } else {
        return Err(format!("Pattern must be /regex/ or /regex/i: {entry}"));
    };

    if inner.is_empty() {
        return Err("Empty pattern not allowed".to_string());
    }

    NotificationRule::pattern(inner, case_sensitive).map_err(|e| e.to_string())
}

/// Apply a flat configuration map, returning the assembled defaults and
/// one diagnostic per rejected key or value.
pub fn apply_config(map: &HashMap<String, String>) -> (SessionDefaults, Vec<String>) {
    let mut defaults = SessionDefaults::default();
    let mut warnings = Vec::new();

    // Thresholds are collected first so ordering between the slow.* keys
    // does not matter, then validated as a set.
    let mut warn_ms = defaults.slow.warn_ms;
    let mut slow_ms = defaults.slow.slow_ms;
    let mut critical_ms = defaults.slow.critical_ms;
    let mut thresholds_configured = false;

    // Deterministic application order for reproducible diagnostics.
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    for key in keys {
        let value = map[key].as_str();
        match key.as_str() {
            "default.levels" => {
                let (levels, invalid) = parse_level_spec(value);
                if invalid.is_empty() {
                    defaults.levels = levels;
                } else {
                    warnings.push(format!("default.levels: unknown level(s) {}", invalid.join(", ")));
                }
            }
            "default.follow" => match parse_bool(value) {
                Some(follow) => defaults.follow = follow,
                None => warnings.push(format!("default.follow: not a boolean: {value}")),
            },
            "slow.warn" | "highlighting.duration.slow" => match value.parse::<f64>() {
                Ok(ms) => {
                    warn_ms = ms;
                    thresholds_configured = true;
                }
                Err(_) => warnings.push(format!("{key}: not a number: {value}")),
            },
            "slow.error" | "highlighting.duration.very_slow" => match value.parse::<f64>() {
                Ok(ms) => {
                    slow_ms = ms;
                    thresholds_configured = true;
                }
                Err(_) => warnings.push(format!("{key}: not a number: {value}")),
            },
            "slow.critical" | "highlighting.duration.critical" => match value.parse::<f64>() {
                Ok(ms) => {
                    critical_ms = ms;
                    thresholds_configured = true;
                }
                Err(_) => warnings.push(format!("{key}: not a number: {value}")),
            },
            "notifications.enabled" => match parse_bool(value) {
                Some(enabled) => defaults.notifications.enabled = enabled,
                None => warnings.push(format!("notifications.enabled: not a boolean: {value}")),
            },
            "notifications.levels" => {
                let (levels, invalid) = parse_level_spec(value);
                if !invalid.is_empty() {
                    warnings.push(format!(
                        "notifications.levels: unknown level(s) {}",
                        invalid.join(", ")
                    ));
                } else if let Some(levels) = levels {
                    defaults
                        .notifications
                        .add_rule(NotificationRule::Level(levels));
                }
            }
            "notifications.patterns" => {
                for entry in value.split(',').filter(|s| !s.trim().is_empty()) {
                    match parse_config_pattern(entry) {
                        Ok(rule) => defaults.notifications.add_rule(rule),
                        Err(e) => warnings.push(format!("notifications.patterns: {e}")),
                    }
                }
            }
            "notifications.error_rate" => match value.parse::<u64>() {
                Ok(threshold) => defaults
                    .notifications
                    .add_rule(NotificationRule::ErrorRate(threshold)),
                Err(_) => warnings.push(format!("notifications.error_rate: not a number: {value}")),
            },
            "notifications.slow_query_ms" => match value.parse::<u64>() {
                Ok(threshold) => defaults
                    .notifications
                    .add_rule(NotificationRule::SlowQuery(threshold)),
                Err(_) => {
                    warnings.push(format!("notifications.slow_query_ms: not a number: {value}"))
                }
            },
            "notifications.quiet_hours" => match QuietHours::parse(value) {
                Ok(quiet) => defaults.notifications.quiet_hours = Some(quiet),
                Err(e) => warnings.push(format!("notifications.quiet_hours: {e}")),
            },
            other => {
                if let Some(name) = other.strip_prefix("highlighting.enabled_highlighters.") {
                    match parse_bool(value) {
                        Some(enabled) => defaults
                            .enabled_highlighters
                            .push((name.to_string(), enabled)),
                        None => warnings.push(format!("{other}: not a boolean: {value}")),
                    }
                } else {
                    warnings.push(format!("Unknown config key: {other}"));
                }
            }
        }
    }

    if thresholds_configured {
        match SlowQueryConfig::validate(warn_ms, slow_ms, critical_ms) {
            Ok(()) => {
                defaults.slow.warn_ms = warn_ms;
                defaults.slow.slow_ms = slow_ms;
                defaults.slow.critical_ms = critical_ms;
                defaults.slow.enabled = true;
            }
            Err(e) => warnings.push(format!("slow thresholds: {e}")),
        }
    }

    (defaults, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_map_gives_defaults() {
        let (defaults, warnings) = apply_config(&HashMap::new());
        assert!(warnings.is_empty());
        assert!(defaults.levels.is_none());
        assert!(defaults.follow);
        assert!(!defaults.notifications.enabled);
    }

    #[test]
    fn test_default_levels_and_follow() {
        let (defaults, warnings) = apply_config(&map(&[
            ("default.levels", "warning+"),
            ("default.follow", "false"),
        ]));
        assert!(warnings.is_empty());
        let levels = defaults.levels.unwrap();
        assert!(levels.contains(&LogLevel::Warning));
        assert!(levels.contains(&LogLevel::Panic));
        assert!(!levels.contains(&LogLevel::Log));
        assert!(!defaults.follow);
    }

    #[test]
    fn test_slow_thresholds() {
        let (defaults, warnings) = apply_config(&map(&[
            ("slow.warn", "50"),
            ("slow.error", "250"),
            ("slow.critical", "900"),
        ]));
        assert!(warnings.is_empty());
        assert_eq!(defaults.slow.warn_ms, 50.0);
        assert_eq!(defaults.slow.slow_ms, 250.0);
        assert_eq!(defaults.slow.critical_ms, 900.0);
        assert!(defaults.slow.enabled);
    }

    #[test]
    fn test_invalid_threshold_order_rejected() {
        let (defaults, warnings) = apply_config(&map(&[
            ("slow.warn", "900"),
            ("slow.error", "250"),
            ("slow.critical", "50"),
        ]));
        assert_eq!(warnings.len(), 1);
        // Defaults survive the rejected override.
        assert_eq!(defaults.slow.warn_ms, 100.0);
    }

    #[test]
    fn test_notification_keys() {
        let (defaults, warnings) = apply_config(&map(&[
            ("notifications.enabled", "true"),
            ("notifications.levels", "fatal,panic"),
            ("notifications.patterns", "/deadlock/i,/corrupt/"),
            ("notifications.error_rate", "10"),
            ("notifications.slow_query_ms", "2000"),
            ("notifications.quiet_hours", "22:00-08:00"),
        ]));
        assert!(warnings.is_empty(), "{warnings:?}");
        assert!(defaults.notifications.enabled);
        assert_eq!(defaults.notifications.rules.len(), 5);
        assert!(defaults.notifications.quiet_hours.is_some());
    }

    #[test]
    fn test_enabled_highlighters() {
        let (defaults, warnings) = apply_config(&map(&[
            ("highlighting.enabled_highlighters.sql_keywords", "false"),
            ("highlighting.enabled_highlighters.numbers", "true"),
        ]));
        assert!(warnings.is_empty());
        assert_eq!(defaults.enabled_highlighters.len(), 2);
        assert!(defaults
            .enabled_highlighters
            .contains(&("sql_keywords".to_string(), false)));
    }

    #[test]
    fn test_unknown_key_and_bad_values_warn() {
        let (defaults, warnings) = apply_config(&map(&[
            ("totally.unknown", "x"),
            ("default.follow", "maybe"),
            ("notifications.error_rate", "lots"),
            ("notifications.quiet_hours", "sometimes"),
        ]));
        assert_eq!(warnings.len(), 4);
        // Prior state intact for each rejected key.
        assert!(defaults.follow);
        assert!(defaults.notifications.rules.is_empty());
    }
}
