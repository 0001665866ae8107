//! Span-producing highlighter chain.
//!
//! Each named highlighter scans a raw line and yields `(start, end,
//! style)` annotations; the chain resolves overlaps by priority and
//! converts the result into `(style, text)` runs for the renderer. The
//! concatenated run text always equals the input line.

use regex::{Regex, RegexBuilder};

use crate::filter::FilterError;
use crate::stats::{SlowQueryConfig, SlowQueryLevel};

/// Semantic style tokens; the terminal layer maps these to colors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HighlightStyle {
    SqlKeyword,
    Timestamp,
    Number,
    StringLiteral,
    SqlState,
    DurationWarning,
    DurationSlow,
    DurationCritical,
    /// User-defined highlighter, carrying its name.
    Custom(String),
}

/// A styled span in a raw line (byte offsets).
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub style: HighlightStyle,
}

/// One run of a rendered line: unstyled text has `None`.
pub type StyledRun = (Option<HighlightStyle>, String);

enum HighlighterKind {
    /// Fixed style for every match.
    Pattern { regex: Regex, style: HighlightStyle },
    /// Style chosen from the matched duration value.
    Duration { regex: Regex, config: SlowQueryConfig },
}

/// A named highlighter with a priority; higher priority wins overlaps.
pub struct Highlighter {
    pub name: String,
    pub priority: i32,
    pub enabled: bool,
    kind: HighlighterKind,
}

impl Highlighter {
    fn spans(&self, text: &str, out: &mut Vec<(i32, Span)>) {
        match &self.kind {
            HighlighterKind::Pattern { regex, style } => {
                for m in regex.find_iter(text) {
                    out.push((
                        self.priority,
                        Span {
                            start: m.start(),
                            end: m.end(),
                            style: style.clone(),
                        },
                    ));
                }
            }
            HighlighterKind::Duration { regex, config } => {
                for caps in regex.captures_iter(text) {
                    let Some(whole) = caps.get(0) else { continue };
                    let Ok(mut value) = caps[1].parse::<f64>() else {
                        continue;
                    };
                    if caps[2].eq_ignore_ascii_case("s") {
                        value *= 1000.0;
                    }
                    let style = match config.classify(value) {
                        Some(SlowQueryLevel::Critical) => HighlightStyle::DurationCritical,
                        Some(SlowQueryLevel::Slow) => HighlightStyle::DurationSlow,
                        Some(SlowQueryLevel::Warning) => HighlightStyle::DurationWarning,
                        None => continue,
                    };
                    out.push((
                        self.priority,
                        Span {
                            start: whole.start(),
                            end: whole.end(),
                            style,
                        },
                    ));
                }
            }
        }
    }
}

const SQL_KEYWORDS_PATTERN: &str = r"(?i)\b(?:SELECT|INSERT|UPDATE|DELETE|CREATE|ALTER|DROP|TABLE|INDEX|VIEW|TRIGGER|FUNCTION|PROCEDURE|FROM|WHERE|JOIN|LEFT|RIGHT|INNER|OUTER|ON|AS|ORDER|BY|GROUP|HAVING|LIMIT|OFFSET|INTO|VALUES|SET|AND|OR|NOT|IN|EXISTS|BETWEEN|LIKE|IS|NULL|UNION|INTERSECT|EXCEPT|DISTINCT|ALL|ANY|CASE|WHEN|THEN|ELSE|END|WITH|RECURSIVE|OVER|PARTITION|WINDOW|CROSS|FULL|NATURAL|USING|LATERAL|ASC|DESC|NULLS|FIRST|LAST|CAST|COALESCE|NULLIF|RETURNS|BEGIN|COMMIT|ROLLBACK|GRANT|REVOKE|PRIMARY|KEY|FOREIGN|REFERENCES|CONSTRAINT|DEFAULT|CHECK|UNIQUE|TRUE|FALSE)\b";

const TIMESTAMP_PATTERN: &str =
    r"\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}:\d{2}(?:\.\d+)?|\b\d{2}:\d{2}:\d{2}\.\d{3}\b";

const NUMBER_PATTERN: &str = r"\b\d+(?:\.\d+)?\b";

const STRING_PATTERN: &str = r"'(?:[^']|'')*'";

// SQLSTATE codes are 5 alphanumerics with a digit within the first three
// positions (covers 42P01, P0001, XX000, HV001, ...). Requiring the digit
// keeps 5-letter SQL keywords out.
const SQLSTATE_PATTERN: &str =
    r"\b(?:[0-9][A-Z0-9]{4}|[A-Z][0-9][A-Z0-9]{3}|[A-Z]{2}[0-9][A-Z0-9]{2})\b";

const DURATION_PATTERN: &str = r"(?i)duration:\s*(\d+\.?\d*)\s*(ms|s)\b";

/// The cached, resettable chain of highlighters owned by the runtime.
pub struct HighlighterChain {
    highlighters: Vec<Highlighter>,
    duration_config: SlowQueryConfig,
}

impl HighlighterChain {
    /// Build the chain of built-in highlighters.
    pub fn new(duration_config: SlowQueryConfig) -> Self {
        let mut chain = HighlighterChain {
            highlighters: Vec::new(),
            duration_config,
        };
        chain.install_builtins();
        chain
    }

    fn install_builtins(&mut self) {
        let pattern = |name: &str, priority: i32, regex: &str, style: HighlightStyle| {
            Highlighter {
                name: name.to_string(),
                priority,
                enabled: true,
                kind: HighlighterKind::Pattern {
                    // Built-in patterns are static and known-valid.
                    regex: Regex::new(regex).unwrap(),
                    style,
                },
            }
        };

        self.highlighters = vec![
            Highlighter {
                name: "duration".to_string(),
                priority: 100,
                enabled: self.duration_config.enabled,
                kind: HighlighterKind::Duration {
                    regex: Regex::new(DURATION_PATTERN).unwrap(),
                    config: self.duration_config,
                },
            },
            pattern("sqlstate", 90, SQLSTATE_PATTERN, HighlightStyle::SqlState),
            pattern("timestamps", 80, TIMESTAMP_PATTERN, HighlightStyle::Timestamp),
            pattern("strings", 70, STRING_PATTERN, HighlightStyle::StringLiteral),
            pattern(
                "sql_keywords",
                60,
                SQL_KEYWORDS_PATTERN,
                HighlightStyle::SqlKeyword,
            ),
            pattern("numbers", 50, NUMBER_PATTERN, HighlightStyle::Number),
        ];
    }

    /// Rebuild the built-ins, dropping custom highlighters and enable
    /// overrides.
    pub fn reset(&mut self) {
        self.install_builtins();
    }

    /// Replace the duration thresholds and rebuild the duration
    /// highlighter in place.
    pub fn set_duration_config(&mut self, config: SlowQueryConfig) {
        self.duration_config = config;
        for h in &mut self.highlighters {
            if let HighlighterKind::Duration { config: c, .. } = &mut h.kind {
                *c = config;
                h.enabled = config.enabled;
            }
        }
    }

    /// Enable or disable a highlighter by name. Returns whether the name
    /// was known.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.highlighters.iter_mut().find(|h| h.name == name) {
            Some(h) => {
                h.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Add a user-defined regex highlighter.
    pub fn add_custom(
        &mut self,
        name: &str,
        pattern: &str,
        case_sensitive: bool,
        priority: i32,
    ) -> Result<(), FilterError> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| FilterError::new(format!("Invalid pattern '{pattern}': {e}")))?;

        // Replace an existing highlighter with the same name.
        self.highlighters.retain(|h| h.name != name);
        self.highlighters.push(Highlighter {
            name: name.to_string(),
            priority,
            enabled: true,
            kind: HighlighterKind::Pattern {
                regex,
                style: HighlightStyle::Custom(name.to_string()),
            },
        });
        Ok(())
    }

    /// Remove a custom highlighter. Returns whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.highlighters.len();
        self.highlighters.retain(|h| h.name != name);
        self.highlighters.len() != before
    }

    pub fn names(&self) -> Vec<&str> {
        self.highlighters.iter().map(|h| h.name.as_str()).collect()
    }

    /// Non-overlapping styled spans for a line, highest priority first at
    /// each position.
    pub fn highlight(&self, text: &str) -> Vec<Span> {
        let mut candidates: Vec<(i32, Span)> = Vec::new();
        for h in &self.highlighters {
            if h.enabled {
                h.spans(text, &mut candidates);
            }
        }

        // Higher priority first, then earlier start, then longer span.
        candidates.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then(a.1.start.cmp(&b.1.start))
                .then(b.1.end.cmp(&a.1.end))
        });

        let mut accepted: Vec<Span> = Vec::new();
        for (_, span) in candidates {
            let overlaps = accepted
                .iter()
                .any(|s| span.start < s.end && s.start < span.end);
            if !overlaps {
                accepted.push(span);
            }
        }

        accepted.sort_by_key(|s| s.start);
        accepted
    }

    /// Render a line into `(style, text)` runs covering all of `text`.
    pub fn render(&self, text: &str) -> Vec<StyledRun> {
        let spans = self.highlight(text);
        let mut runs: Vec<StyledRun> = Vec::new();
        let mut pos = 0;

        for span in spans {
            if span.start > pos {
                runs.push((None, text[pos..span.start].to_string()));
            }
            runs.push((Some(span.style), text[span.start..span.end].to_string()));
            pos = span.end;
        }

        if pos < text.len() {
            runs.push((None, text[pos..].to_string()));
        }

        if runs.is_empty() {
            runs.push((None, String::new()));
        }

        runs
    }
}

impl Default for HighlighterChain {
    fn default() -> Self {
        Self::new(SlowQueryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(runs: &[StyledRun]) -> String {
        runs.iter().map(|(_, t)| t.as_str()).collect()
    }

    #[test]
    fn test_render_roundtrips_raw_text() {
        let chain = HighlighterChain::default();
        let lines = [
            "2024-01-15 10:30:45.123 UTC [12345] ERROR:  42P01: relation 'users' does not exist",
            "plain line with nothing to highlight at all........",
            "duration: 1234.5 ms  statement: SELECT * FROM t WHERE id = 7",
            "",
        ];
        for line in lines {
            assert_eq!(join(&chain.render(line)), line);
        }
    }

    #[test]
    fn test_sql_keywords_highlighted() {
        let chain = HighlighterChain::default();
        let runs = chain.render("SELECT id FROM users");
        let keyword_runs: Vec<&StyledRun> = runs
            .iter()
            .filter(|(s, _)| *s == Some(HighlightStyle::SqlKeyword))
            .collect();
        assert_eq!(keyword_runs.len(), 2);
        assert_eq!(keyword_runs[0].1, "SELECT");
        assert_eq!(keyword_runs[1].1, "FROM");
    }

    #[test]
    fn test_sqlstate_highlighted_but_not_keywords() {
        let chain = HighlighterChain::default();
        let spans = chain.highlight("ERROR: 42P01 WHERE");
        assert!(spans
            .iter()
            .any(|s| s.style == HighlightStyle::SqlState));
        // WHERE is 5 uppercase letters but no digit: keyword, not a code.
        assert!(!spans
            .iter()
            .any(|s| s.style == HighlightStyle::SqlState && s.start > 7));
    }

    #[test]
    fn test_duration_coloring_by_threshold() {
        let mut config = SlowQueryConfig::default();
        config.enabled = true;
        let chain = HighlighterChain::new(config);

        let spans = chain.highlight("duration: 50.0 ms");
        assert!(spans.iter().all(|s| {
            !matches!(
                s.style,
                HighlightStyle::DurationWarning
                    | HighlightStyle::DurationSlow
                    | HighlightStyle::DurationCritical
            )
        }));

        let spans = chain.highlight("duration: 200.0 ms");
        assert!(spans
            .iter()
            .any(|s| s.style == HighlightStyle::DurationWarning));

        let spans = chain.highlight("duration: 2.5 s");
        assert!(spans
            .iter()
            .any(|s| s.style == HighlightStyle::DurationCritical));
    }

    #[test]
    fn test_string_literals() {
        let chain = HighlighterChain::default();
        let spans = chain.highlight("value = 'it''s quoted'");
        assert!(spans
            .iter()
            .any(|s| s.style == HighlightStyle::StringLiteral));
    }

    #[test]
    fn test_custom_highlighter_and_reset() {
        let mut chain = HighlighterChain::default();
        chain.add_custom("mytable", "orders_\\d+", true, 120).unwrap();

        let spans = chain.highlight("UPDATE orders_42 SET x = 1");
        assert!(spans
            .iter()
            .any(|s| s.style == HighlightStyle::Custom("mytable".to_string())));

        chain.reset();
        let spans = chain.highlight("UPDATE orders_42 SET x = 1");
        assert!(!spans
            .iter()
            .any(|s| matches!(s.style, HighlightStyle::Custom(_))));
    }

    #[test]
    fn test_invalid_custom_pattern_rejected() {
        let mut chain = HighlighterChain::default();
        assert!(chain.add_custom("bad", "((", true, 10).is_err());
    }

    #[test]
    fn test_disable_highlighter() {
        let mut chain = HighlighterChain::default();
        assert!(chain.set_enabled("sql_keywords", false));
        let spans = chain.highlight("SELECT 1");
        assert!(!spans
            .iter()
            .any(|s| s.style == HighlightStyle::SqlKeyword));
        assert!(!chain.set_enabled("nonexistent", false));
    }

    #[test]
    fn test_overlap_resolved_by_priority() {
        let chain = HighlighterChain::default();
        // The timestamp pattern (priority 80) wins over numbers (50).
        let spans = chain.highlight("2024-01-15 10:30:45.123");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].style, HighlightStyle::Timestamp);
    }
}
