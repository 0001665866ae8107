//! Notification rules, rate limiting, quiet hours and the engine that
//! evaluates every record.
//!
//! Platform dispatch is behind the [`Notifier`] trait; the core only
//! decides *whether* to notify.

use std::time::{Duration, Instant};

use chrono::{Local, NaiveTime};
use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::filter::FilterError;
use crate::model::{LogLevel, LogRecord};
use crate::stats::{extract_duration, ErrorStats};

/// Minimum gap between any two dispatched notifications.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(5);

/// Extra self-suppression for error-rate notifications.
const ERROR_RATE_SUPPRESSION: Duration = Duration::from_secs(60);

/// Platform notification dispatcher, implemented outside the core.
pub trait Notifier: Send {
    /// Send a notification; returns success.
    fn send(&self, title: &str, body: &str, subtitle: Option<&str>) -> bool;

    /// Whether the platform can show notifications at all.
    fn is_available(&self) -> bool;

    /// Platform and method description for diagnostics.
    fn platform_info(&self) -> String;
}

/// Fallback notifier for environments with no notification support.
pub struct NoOpNotifier {
    reason: String,
}

impl NoOpNotifier {
    pub fn new(reason: impl Into<String>) -> Self {
        NoOpNotifier {
            reason: reason.into(),
        }
    }
}

impl Notifier for NoOpNotifier {
    fn send(&self, _title: &str, _body: &str, _subtitle: Option<&str>) -> bool {
        false
    }

    fn is_available(&self) -> bool {
        false
    }

    fn platform_info(&self) -> String {
        self.reason.clone()
    }
}

/// A notification trigger.
#[derive(Debug, Clone)]
pub enum NotificationRule {
    /// Trigger on specific levels.
    Level(std::collections::HashSet<LogLevel>),
    /// Trigger on a regex match against the message.
    Pattern {
        pattern: String,
        case_sensitive: bool,
        regex: Regex,
    },
    /// Trigger when errors per minute exceed the threshold.
    ErrorRate(u64),
    /// Trigger when a query duration exceeds the threshold (ms).
    SlowQuery(u64),
}

impl NotificationRule {
    /// Compile a pattern rule.
    pub fn pattern(pattern: &str, case_sensitive: bool) -> Result<Self, FilterError> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| FilterError::new(format!("Invalid pattern '{pattern}': {e}")))?;
        Ok(NotificationRule::Pattern {
            pattern: pattern.to_string(),
            case_sensitive,
            regex,
        })
    }
}

/// Time-of-day window during which notifications are suppressed.
/// Overnight ranges (start > end) are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    /// Parse `HH:MM-HH:MM`.
    pub fn parse(range: &str) -> Result<QuietHours, FilterError> {
        let invalid = || FilterError::new("Invalid format. Use: HH:MM-HH:MM");

        let (start_str, end_str) = range.split_once('-').ok_or_else(invalid)?;
        let start = NaiveTime::parse_from_str(start_str.trim(), "%H:%M").map_err(|_| invalid())?;
        let end = NaiveTime::parse_from_str(end_str.trim(), "%H:%M").map_err(|_| invalid())?;

        Ok(QuietHours { start, end })
    }

    /// True if `now` falls inside the window.
    pub fn is_active_at(&self, now: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= now && now <= self.end
        } else {
            // Overnight range (e.g. 22:00-08:00)
            now >= self.start || now <= self.end
        }
    }

    /// True if the local wall clock is inside the window.
    pub fn is_active(&self) -> bool {
        self.is_active_at(Local::now().time())
    }
}

impl std::fmt::Display for QuietHours {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

/// Active notification rules and settings.
#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub rules: Vec<NotificationRule>,
    pub quiet_hours: Option<QuietHours>,
}

impl NotificationConfig {
    /// Add a rule. Level rules merge into an existing level rule;
    /// ErrorRate and SlowQuery replace their singleton; patterns are
    /// additive.
    pub fn add_rule(&mut self, rule: NotificationRule) {
        match rule {
            NotificationRule::Level(levels) => {
                if let Some(NotificationRule::Level(existing)) = self
                    .rules
                    .iter_mut()
                    .find(|r| matches!(r, NotificationRule::Level(_)))
                {
                    existing.extend(levels);
                } else {
                    self.rules.push(NotificationRule::Level(levels));
                }
            }
            NotificationRule::ErrorRate(threshold) => {
                self.rules
                    .retain(|r| !matches!(r, NotificationRule::ErrorRate(_)));
                self.rules.push(NotificationRule::ErrorRate(threshold));
            }
            NotificationRule::SlowQuery(threshold) => {
                self.rules
                    .retain(|r| !matches!(r, NotificationRule::SlowQuery(_)));
                self.rules.push(NotificationRule::SlowQuery(threshold));
            }
            pattern @ NotificationRule::Pattern { .. } => {
                self.rules.push(pattern);
            }
        }
    }

    pub fn clear_rules(&mut self) {
        self.rules.clear();
    }

    fn level_set(&self) -> Option<&std::collections::HashSet<LogLevel>> {
        self.rules.iter().find_map(|r| match r {
            NotificationRule::Level(levels) => Some(levels),
            _ => None,
        })
    }

    fn error_rate_threshold(&self) -> Option<u64> {
        self.rules.iter().find_map(|r| match r {
            NotificationRule::ErrorRate(t) => Some(*t),
            _ => None,
        })
    }

    fn slow_query_threshold(&self) -> Option<u64> {
        self.rules.iter().find_map(|r| match r {
            NotificationRule::SlowQuery(t) => Some(*t),
            _ => None,
        })
    }
}

/// Minimum-gap rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    last_sent: Option<Instant>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        RateLimiter {
            window,
            last_sent: None,
        }
    }

    /// Whether a notification may be sent now. Does not update state;
    /// call `record_sent` after an actual send.
    pub fn should_allow(&self) -> bool {
        match self.last_sent {
            None => true,
            Some(last) => last.elapsed() >= self.window,
        }
    }

    pub fn record_sent(&mut self) {
        self.last_sent = Some(Instant::now());
    }

    /// Seconds until the window reopens; 0 when ready.
    pub fn time_until_next(&self) -> f64 {
        match self.last_sent {
            None => 0.0,
            Some(last) => {
                let elapsed = last.elapsed();
                if elapsed >= self.window {
                    0.0
                } else {
                    (self.window - elapsed).as_secs_f64()
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}

/// Session-scoped coordinator: rule matching, rate limiting, quiet hours
/// and dispatch through the platform notifier.
pub struct NotificationEngine {
    notifier: Box<dyn Notifier>,
    pub config: NotificationConfig,
    rate_limiter: RateLimiter,
    last_error_rate_notified: Option<Instant>,
}

impl NotificationEngine {
    pub fn new(notifier: Box<dyn Notifier>, config: NotificationConfig) -> Self {
        NotificationEngine {
            notifier,
            config,
            rate_limiter: RateLimiter::new(RATE_LIMIT_WINDOW),
            last_error_rate_notified: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.notifier.is_available()
    }

    pub fn platform_info(&self) -> String {
        self.notifier.platform_info()
    }

    /// Evaluate a record against the rules and dispatch at most one
    /// notification. Called for every record, not only filter-passing
    /// ones. Returns whether a notification was sent.
    pub fn check(&mut self, record: &LogRecord, error_stats: &ErrorStats) -> bool {
        if !self.config.enabled {
            return false;
        }

        if let Some(quiet) = &self.config.quiet_hours {
            if quiet.is_active() {
                return false;
            }
        }

        if self.matches_level(record) {
            return self.send_for_record(record, "Level Alert");
        }

        if self.matches_pattern(record) {
            return self.send_for_record(record, "Pattern Match");
        }

        if let Some((rate, threshold)) = self.error_rate_exceeded(error_stats) {
            return self.send_error_rate(rate, threshold);
        }

        if let Some((duration, threshold)) = self.slow_query_exceeded(record) {
            return self.send_slow_query(record, duration, threshold);
        }

        false
    }

    fn matches_level(&self, record: &LogRecord) -> bool {
        self.config
            .level_set()
            .is_some_and(|levels| levels.contains(&record.level))
    }

    fn matches_pattern(&self, record: &LogRecord) -> bool {
        self.config.rules.iter().any(|r| match r {
            NotificationRule::Pattern { regex, .. } => regex.is_match(&record.message),
            _ => false,
        })
    }

    /// Error rate over the most recent minute, if above threshold and not
    /// self-suppressed.
    fn error_rate_exceeded(&self, error_stats: &ErrorStats) -> Option<(u64, u64)> {
        let threshold = self.config.error_rate_threshold()?;
        let buckets = error_stats.trend_buckets(1);
        let rate = *buckets.last()?;
        if rate <= threshold {
            return None;
        }

        // At most one error-rate notification per minute, independent of
        // the global limiter.
        if let Some(last) = self.last_error_rate_notified {
            if last.elapsed() < ERROR_RATE_SUPPRESSION {
                return None;
            }
        }

        Some((rate, threshold))
    }

    fn slow_query_exceeded(&self, record: &LogRecord) -> Option<(f64, u64)> {
        let threshold = self.config.slow_query_threshold()?;
        let duration = extract_duration(&record.message)?;
        if duration > threshold as f64 {
            Some((duration, threshold))
        } else {
            None
        }
    }

    fn send_for_record(&mut self, record: &LogRecord, category: &str) -> bool {
        if !self.rate_limiter.should_allow() {
            return false;
        }

        let title = format!("pgtail: {category}");
        let body = format_record_body(record);
        let subtitle = record.level.name();

        if self.notifier.send(&title, &body, Some(subtitle)) {
            self.rate_limiter.record_sent();
            true
        } else {
            debug!(title, "notification dispatch failed, dropping");
            false
        }
    }

    fn send_error_rate(&mut self, rate: u64, threshold: u64) -> bool {
        if !self.rate_limiter.should_allow() {
            return false;
        }

        let title = "pgtail: High Error Rate";
        let body = format!("Error rate: {rate}/min (threshold: {threshold}/min)");

        if self.notifier.send(title, &body, None) {
            self.rate_limiter.record_sent();
            self.last_error_rate_notified = Some(Instant::now());
            true
        } else {
            debug!(title, "notification dispatch failed, dropping");
            false
        }
    }

    fn send_slow_query(&mut self, record: &LogRecord, duration: f64, threshold: u64) -> bool {
        if !self.rate_limiter.should_allow() {
            return false;
        }

        let title = "pgtail: Slow Query";
        let mut message = record.message.clone();
        if message.len() > 100 {
            let cut = (1..=97).rev().find(|&i| message.is_char_boundary(i)).unwrap_or(0);
            message.truncate(cut);
            message.push_str("...");
        }
        let body = format!("Duration: {duration}ms (threshold: {threshold}ms)\n{message}");

        if self.notifier.send(title, &body, None) {
            self.rate_limiter.record_sent();
            true
        } else {
            debug!(title, "notification dispatch failed, dropping");
            false
        }
    }

    /// Send a test notification, bypassing rate limiting and quiet hours.
    pub fn send_test(&self) -> bool {
        self.notifier.send(
            "pgtail: Test",
            "Notification system is working correctly",
            Some("pgtail"),
        )
    }
}

fn format_record_body(record: &LogRecord) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !record.message.is_empty() {
        let mut msg = record.message.clone();
        if msg.len() > 150 {
            let cut = (1..=147).rev().find(|&i| msg.is_char_boundary(i)).unwrap_or(0);
            msg.truncate(cut);
            msg.push_str("...");
        }
        parts.push(msg);
    }

    if let Some(database) = &record.database {
        parts.push(format!("Database: {database}"));
    }

    if parts.is_empty() {
        "Log event occurred".to_string()
    } else {
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LogFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct RecordingNotifier {
        sent: Arc<AtomicUsize>,
        succeed: bool,
    }

    impl Notifier for RecordingNotifier {
        fn send(&self, _title: &str, _body: &str, _subtitle: Option<&str>) -> bool {
            if self.succeed {
                self.sent.fetch_add(1, Ordering::SeqCst);
            }
            self.succeed
        }

        fn is_available(&self) -> bool {
            true
        }

        fn platform_info(&self) -> String {
            "test".to_string()
        }
    }

    fn engine_with(
        config: NotificationConfig,
        succeed: bool,
    ) -> (NotificationEngine, Arc<AtomicUsize>) {
        let sent = Arc::new(AtomicUsize::new(0));
        let notifier = RecordingNotifier {
            sent: Arc::clone(&sent),
            succeed,
        };
        (NotificationEngine::new(Box::new(notifier), config), sent)
    }

    fn record(level: LogLevel, message: &str) -> LogRecord {
        LogRecord {
            level,
            timestamp: Some(chrono::Utc::now()),
            message: message.to_string(),
            ..LogRecord::fallback(message, LogFormat::Text)
        }
    }

    #[test]
    fn test_disabled_never_notifies() {
        let mut config = NotificationConfig::default();
        config.add_rule(NotificationRule::Level(
            [LogLevel::Error].into_iter().collect(),
        ));
        let (mut engine, sent) = engine_with(config, true);

        let stats = ErrorStats::new();
        assert!(!engine.check(&record(LogLevel::Error, "boom"), &stats));
        assert_eq!(sent.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_level_rule_fires() {
        let mut config = NotificationConfig {
            enabled: true,
            ..NotificationConfig::default()
        };
        config.add_rule(NotificationRule::Level(
            [LogLevel::Fatal].into_iter().collect(),
        ));
        let (mut engine, sent) = engine_with(config, true);

        let stats = ErrorStats::new();
        assert!(engine.check(&record(LogLevel::Fatal, "down"), &stats));
        assert!(!engine.check(&record(LogLevel::Error, "other"), &stats));
        assert_eq!(sent.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_global_rate_limiter_blocks_second_send() {
        let mut config = NotificationConfig {
            enabled: true,
            ..NotificationConfig::default()
        };
        config.add_rule(NotificationRule::Level(
            [LogLevel::Error].into_iter().collect(),
        ));
        let (mut engine, sent) = engine_with(config, true);

        let stats = ErrorStats::new();
        assert!(engine.check(&record(LogLevel::Error, "one"), &stats));
        assert!(!engine.check(&record(LogLevel::Error, "two"), &stats));
        assert_eq!(sent.load(Ordering::SeqCst), 1);
        assert!(engine.rate_limiter.time_until_next() > 0.0);
    }

    #[test]
    fn test_pattern_rule() {
        let mut config = NotificationConfig {
            enabled: true,
            ..NotificationConfig::default()
        };
        config.add_rule(NotificationRule::pattern("deadlock", false).unwrap());
        let (mut engine, sent) = engine_with(config, true);

        let stats = ErrorStats::new();
        assert!(engine.check(&record(LogLevel::Log, "Deadlock detected"), &stats));
        assert_eq!(sent.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_rate_fires_once_then_suppressed() {
        let mut config = NotificationConfig {
            enabled: true,
            ..NotificationConfig::default()
        };
        config.add_rule(NotificationRule::ErrorRate(5));
        let (mut engine, sent) = engine_with(config, true);

        let mut stats = ErrorStats::new();
        let mut fired = 0;
        for _ in 0..20 {
            stats.add(&record(LogLevel::Error, "boom"));
            if engine.check(&record(LogLevel::Error, "boom"), &stats) {
                fired += 1;
            }
        }

        // Exactly one error-rate notification, self-suppressed after.
        assert_eq!(fired, 1);
        assert_eq!(sent.load(Ordering::SeqCst), 1);

        // Still suppressed immediately afterwards.
        assert!(!engine.check(&record(LogLevel::Error, "boom"), &stats));
    }

    #[test]
    fn test_slow_query_rule() {
        let mut config = NotificationConfig {
            enabled: true,
            ..NotificationConfig::default()
        };
        config.add_rule(NotificationRule::SlowQuery(500));
        let (mut engine, sent) = engine_with(config, true);

        let stats = ErrorStats::new();
        assert!(!engine.check(&record(LogLevel::Log, "duration: 120.0 ms"), &stats));
        assert!(engine.check(&record(LogLevel::Log, "duration: 1200.0 ms"), &stats));
        assert_eq!(sent.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_failure_does_not_consume_window() {
        let mut config = NotificationConfig {
            enabled: true,
            ..NotificationConfig::default()
        };
        config.add_rule(NotificationRule::Level(
            [LogLevel::Error].into_iter().collect(),
        ));
        let (mut engine, sent) = engine_with(config, false);

        let stats = ErrorStats::new();
        assert!(!engine.check(&record(LogLevel::Error, "boom"), &stats));
        assert_eq!(sent.load(Ordering::SeqCst), 0);
        // Window stays open for the next attempt.
        assert!(engine.rate_limiter.should_allow());
    }

    #[test]
    fn test_quiet_hours_same_day() {
        let quiet = QuietHours::parse("09:00-17:00").unwrap();
        assert!(quiet.is_active_at(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
        assert!(!quiet.is_active_at(NaiveTime::from_hms_opt(8, 59, 0).unwrap()));
        assert!(!quiet.is_active_at(NaiveTime::from_hms_opt(17, 1, 0).unwrap()));
    }

    #[test]
    fn test_quiet_hours_overnight() {
        let quiet = QuietHours::parse("22:00-08:00").unwrap();
        assert!(quiet.is_active_at(NaiveTime::from_hms_opt(23, 30, 0).unwrap()));
        assert!(quiet.is_active_at(NaiveTime::from_hms_opt(3, 0, 0).unwrap()));
        assert!(!quiet.is_active_at(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn test_quiet_hours_parse_errors() {
        assert!(QuietHours::parse("2200-0800").is_err());
        assert!(QuietHours::parse("22:00").is_err());
        assert!(QuietHours::parse("25:00-08:00").is_err());
    }

    #[test]
    fn test_rule_merge_semantics() {
        let mut config = NotificationConfig::default();
        config.add_rule(NotificationRule::Level(
            [LogLevel::Error].into_iter().collect(),
        ));
        config.add_rule(NotificationRule::Level(
            [LogLevel::Fatal].into_iter().collect(),
        ));
        config.add_rule(NotificationRule::ErrorRate(5));
        config.add_rule(NotificationRule::ErrorRate(10));
        config.add_rule(NotificationRule::pattern("a", true).unwrap());
        config.add_rule(NotificationRule::pattern("b", true).unwrap());

        // One merged level rule, one error-rate rule, two pattern rules.
        assert_eq!(config.rules.len(), 4);
        assert_eq!(config.level_set().unwrap().len(), 2);
        assert_eq!(config.error_rate_threshold(), Some(10));
    }
}
