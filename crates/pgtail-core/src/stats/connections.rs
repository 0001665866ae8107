//! Connection lifecycle tracking from log messages.
//!
//! Recognizes `connection authorized` / `disconnection` messages and a
//! fixed set of FATAL connection-failure phrases. For CSV/JSON sources the
//! structured fields override anything extracted from the message text.

use std::collections::{HashMap, VecDeque};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::model::{LogLevel, LogRecord};

/// Bound on the retained event history.
const MAX_EVENTS: usize = 10_000;

/// Type of connection event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEventType {
    Connect,
    Disconnect,
    Failed,
}

/// A tracked connection event.
#[derive(Debug, Clone)]
pub struct ConnectionEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: ConnectionEventType,
    pub pid: Option<u32>,
    pub user: Option<String>,
    pub database: Option<String>,
    pub application: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Session duration, disconnect events only.
    pub duration_seconds: Option<f64>,
}

fn authorized_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"connection authorized:\s+user=(?P<user>\S+)\s+database=(?P<database>\S+)(?:\s+application_name=(?P<application>\S+))?",
        )
        .unwrap()
    })
}

fn disconnection_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"disconnection:\s+session time:\s+(?P<duration>[\d:.]+)\s+user=(?P<user>\S+)\s+database=(?P<database>\S+)\s+host=(?P<host>\S+)(?:\s+port=(?P<port>\d+))?",
        )
        .unwrap()
    })
}

/// FATAL message phrases that indicate a failed connection attempt.
fn failure_res() -> &'static Vec<Regex> {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            "too many connections",
            "too many clients already",
            "connection limit exceeded",
            "password authentication failed",
            "no pg_hba\\.conf entry",
            "database .* does not exist",
            "role .* does not exist",
            "authentication failed",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

/// Fields extracted from a connection message.
#[derive(Debug, Default, Clone)]
pub struct ConnectionFields {
    pub user: Option<String>,
    pub database: Option<String>,
    pub application: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub duration: Option<String>,
}

/// Classify a log message as a connection event and extract its fields.
///
/// `connection received` messages are intentionally not tracked: they
/// occur before authentication and carry no user/database; the
/// `connection authorized` message is the meaningful connect event.
pub fn parse_connection_message(
    message: &str,
    is_fatal: bool,
) -> Option<(ConnectionEventType, ConnectionFields)> {
    if message.is_empty() {
        return None;
    }

    if let Some(caps) = authorized_re().captures(message) {
        return Some((
            ConnectionEventType::Connect,
            ConnectionFields {
                user: caps.name("user").map(|m| m.as_str().to_string()),
                database: caps.name("database").map(|m| m.as_str().to_string()),
                application: caps.name("application").map(|m| m.as_str().to_string()),
                ..ConnectionFields::default()
            },
        ));
    }

    if let Some(caps) = disconnection_re().captures(message) {
        return Some((
            ConnectionEventType::Disconnect,
            ConnectionFields {
                user: caps.name("user").map(|m| m.as_str().to_string()),
                database: caps.name("database").map(|m| m.as_str().to_string()),
                host: caps.name("host").map(|m| m.as_str().to_string()),
                port: caps.name("port").and_then(|m| m.as_str().parse().ok()),
                duration: caps.name("duration").map(|m| m.as_str().to_string()),
                ..ConnectionFields::default()
            },
        ));
    }

    if is_fatal {
        let lower = message.to_lowercase();
        if failure_res().iter().any(|re| re.is_match(&lower)) {
            return Some((ConnectionEventType::Failed, ConnectionFields::default()));
        }
    }

    None
}

/// Parse PostgreSQL's `H:MM:SS.mmm` session time into seconds.
pub fn parse_session_duration(duration: &str) -> Option<f64> {
    let parts: Vec<&str> = duration.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: u64 = parts[0].parse().ok()?;
    let minutes: u64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;
    Some(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
}

impl ConnectionEvent {
    /// Build an event from a record, or `None` if the record is not
    /// connection-related. Structured fields win over message text.
    pub fn from_record(record: &LogRecord) -> Option<ConnectionEvent> {
        let is_fatal = record.level == LogLevel::Fatal;
        let (event_type, fields) = parse_connection_message(&record.message, is_fatal)?;

        let duration_seconds = if event_type == ConnectionEventType::Disconnect {
            fields.duration.as_deref().and_then(parse_session_duration)
        } else {
            None
        };

        Some(ConnectionEvent {
            timestamp: record.timestamp.unwrap_or_else(Utc::now),
            event_type,
            pid: record.pid,
            user: record.user.clone().or(fields.user),
            database: record.database.clone().or(fields.database),
            application: record
                .application
                .clone()
                .or(fields.application)
                .unwrap_or_else(|| "unknown".to_string()),
            host: record.remote_host.clone().or(fields.host),
            port: record.remote_port.or(fields.port),
            duration_seconds,
        })
    }
}

/// Session-scoped connection statistics aggregator.
#[derive(Debug)]
pub struct ConnectionStats {
    events: VecDeque<ConnectionEvent>,
    /// PID -> the CONNECT event still alive.
    active: HashMap<u32, ConnectionEvent>,
    pub session_start: DateTime<Utc>,
    pub connect_count: u64,
    pub disconnect_count: u64,
    pub failed_count: u64,
}

impl Default for ConnectionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStats {
    pub fn new() -> Self {
        ConnectionStats {
            events: VecDeque::new(),
            active: HashMap::new(),
            session_start: Utc::now(),
            connect_count: 0,
            disconnect_count: 0,
            failed_count: 0,
        }
    }

    /// Track the record if it is a connection event. Returns whether it
    /// was one.
    pub fn add(&mut self, record: &LogRecord) -> bool {
        let Some(event) = ConnectionEvent::from_record(record) else {
            return false;
        };

        match event.event_type {
            ConnectionEventType::Connect => {
                self.connect_count += 1;
                if let Some(pid) = event.pid {
                    self.active.insert(pid, event.clone());
                }
            }
            ConnectionEventType::Disconnect => {
                self.disconnect_count += 1;
                // Unmatched disconnects are counted but cannot go negative.
                if let Some(pid) = event.pid {
                    self.active.remove(&pid);
                }
            }
            ConnectionEventType::Failed => {
                self.failed_count += 1;
            }
        }

        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(event);

        true
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.active.clear();
        self.connect_count = 0;
        self.disconnect_count = 0;
        self.failed_count = 0;
        self.session_start = Utc::now();
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Currently active connections (no matching disconnect yet).
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    fn group_active<F>(&self, key: F) -> HashMap<String, u64>
    where
        F: Fn(&ConnectionEvent) -> String,
    {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for event in self.active.values() {
            *counts.entry(key(event)).or_insert(0) += 1;
        }
        counts
    }

    pub fn by_database(&self) -> HashMap<String, u64> {
        self.group_active(|e| e.database.clone().unwrap_or_else(|| "unknown".to_string()))
    }

    pub fn by_user(&self) -> HashMap<String, u64> {
        self.group_active(|e| e.user.clone().unwrap_or_else(|| "unknown".to_string()))
    }

    pub fn by_application(&self) -> HashMap<String, u64> {
        self.group_active(|e| e.application.clone())
    }

    pub fn by_host(&self) -> HashMap<String, u64> {
        self.group_active(|e| e.host.clone().unwrap_or_else(|| "unknown".to_string()))
    }

    /// Events at or after a timestamp, chronological.
    pub fn events_since(&self, since: DateTime<Utc>) -> Vec<&ConnectionEvent> {
        self.events.iter().filter(|e| e.timestamp >= since).collect()
    }

    /// `(connects, disconnects)` per time bucket, oldest bucket first.
    pub fn trend_buckets(&self, minutes: i64, bucket_size: i64) -> Vec<(u64, u64)> {
        let now = Utc::now();
        let num_buckets = (minutes / bucket_size).max(1) as usize;
        let mut buckets = vec![(0u64, 0u64); num_buckets];

        for event in &self.events {
            let age = now - event.timestamp;
            let minutes_ago = age.num_seconds() as f64 / 60.0;
            if !(0.0..minutes as f64).contains(&minutes_ago) {
                continue;
            }
            let bucket_age = ((minutes_ago as i64 / bucket_size) as usize).min(num_buckets - 1);
            let idx = num_buckets - 1 - bucket_age;
            match event.event_type {
                ConnectionEventType::Connect => buckets[idx].0 += 1,
                ConnectionEventType::Disconnect => buckets[idx].1 += 1,
                ConnectionEventType::Failed => {}
            }
        }

        buckets
    }
}
