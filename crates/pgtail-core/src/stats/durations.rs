//! Query duration extraction and streaming statistics.
//!
//! Durations are pulled from `duration: N ms` / `duration: N s` messages.
//! Percentiles are computed from a lazily sorted copy of the samples; the
//! cache is invalidated by any new sample or a clear.

use std::sync::OnceLock;

use regex::Regex;

/// Default highlighter thresholds in milliseconds.
pub const DEFAULT_WARN_MS: f64 = 100.0;
pub const DEFAULT_SLOW_MS: f64 = 500.0;
pub const DEFAULT_CRITICAL_MS: f64 = 1000.0;

fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)duration:\s*(\d+\.?\d*)\s*(ms|s)\b").unwrap())
}

/// Extract a query duration in milliseconds from a log message.
pub fn extract_duration(text: &str) -> Option<f64> {
    let caps = duration_re().captures(text)?;
    let mut value: f64 = caps[1].parse().ok()?;
    if caps[2].eq_ignore_ascii_case("s") {
        value *= 1000.0;
    }
    if value < 0.0 {
        return None;
    }
    Some(value)
}

/// Severity bands for slow-query coloring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlowQueryLevel {
    Warning,
    Slow,
    Critical,
}

/// Duration-highlighter thresholds.
#[derive(Debug, Clone, Copy)]
pub struct SlowQueryConfig {
    pub enabled: bool,
    pub warn_ms: f64,
    pub slow_ms: f64,
    pub critical_ms: f64,
}

impl Default for SlowQueryConfig {
    fn default() -> Self {
        SlowQueryConfig {
            enabled: false,
            warn_ms: DEFAULT_WARN_MS,
            slow_ms: DEFAULT_SLOW_MS,
            critical_ms: DEFAULT_CRITICAL_MS,
        }
    }
}

impl SlowQueryConfig {
    /// Validate `0 < warn < slow < critical`. Returns a one-line
    /// diagnostic on failure.
    pub fn validate(warn: f64, slow: f64, critical: f64) -> Result<(), String> {
        if warn <= 0.0 || slow <= 0.0 || critical <= 0.0 {
            return Err("All thresholds must be positive numbers".to_string());
        }
        if !(warn < slow && slow < critical) {
            return Err(
                "Thresholds must be in ascending order: warn < slow < critical".to_string(),
            );
        }
        Ok(())
    }

    /// Classify a duration, `None` when below every threshold.
    pub fn classify(&self, duration_ms: f64) -> Option<SlowQueryLevel> {
        if duration_ms > self.critical_ms {
            Some(SlowQueryLevel::Critical)
        } else if duration_ms > self.slow_ms {
            Some(SlowQueryLevel::Slow)
        } else if duration_ms > self.warn_ms {
            Some(SlowQueryLevel::Warning)
        } else {
            None
        }
    }
}

/// Read-only snapshot of the duration statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationSummary {
    pub count: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Session-scoped duration sample collection.
///
/// Running sum/min/max give O(1) basics; percentiles sort on demand and
/// cache the sorted copy until the next mutation.
#[derive(Debug, Default)]
pub struct DurationStats {
    samples: Vec<f64>,
    sum: f64,
    min: f64,
    max: f64,
    sorted_cache: Option<Vec<f64>>,
}

impl DurationStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample in milliseconds.
    pub fn add(&mut self, duration_ms: f64) {
        if self.samples.is_empty() || duration_ms < self.min {
            self.min = duration_ms;
        }
        if duration_ms > self.max {
            self.max = duration_ms;
        }
        self.sum += duration_ms;
        self.samples.push(duration_ms);
        self.sorted_cache = None;
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.sum = 0.0;
        self.min = 0.0;
        self.max = 0.0;
        self.sorted_cache = None;
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.sum / self.samples.len() as f64
        }
    }

    pub fn min(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Percentile from the sorted samples at index `⌊p·n⌋` (clamped).
    /// 0 samples -> 0, 1 sample -> the sole value.
    pub fn percentile(&mut self, p: f64) -> f64 {
        let n = self.samples.len();
        if n == 0 {
            return 0.0;
        }
        if n == 1 {
            return self.samples[0];
        }

        let sorted = self.sorted_cache.get_or_insert_with(|| {
            let mut copy = self.samples.clone();
            copy.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            copy
        });

        let idx = ((p * n as f64).floor() as usize).min(n - 1);
        sorted[idx]
    }

    pub fn p50(&mut self) -> f64 {
        self.percentile(0.50)
    }

    pub fn p95(&mut self) -> f64 {
        self.percentile(0.95)
    }

    pub fn p99(&mut self) -> f64 {
        self.percentile(0.99)
    }

    /// Full snapshot for analytics views.
    pub fn summary(&mut self) -> DurationSummary {
        DurationSummary {
            count: self.count(),
            average: self.average(),
            min: self.min(),
            max: self.max(),
            p50: self.p50(),
            p95: self.p95(),
            p99: self.p99(),
        }
    }
}
