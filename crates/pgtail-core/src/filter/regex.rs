//! The regex filter matrix: OR-combined includes, hide-on-match excludes
//! and all-must-match ANDs, built from `/pattern/` tokens.

use regex::{Regex, RegexBuilder};

use super::FilterError;

/// How a compiled pattern participates in filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Line must match (OR with other includes).
    Include,
    /// Any match hides the line.
    Exclude,
    /// Line must match (AND with other ANDs).
    And,
}

/// A compiled regex filter.
#[derive(Debug, Clone)]
pub struct RegexFilter {
    pub pattern: String,
    pub kind: FilterKind,
    pub case_sensitive: bool,
    compiled: Regex,
}

impl RegexFilter {
    /// Compile a filter. `/pattern/` is case-insensitive, `/pattern/c`
    /// case-sensitive.
    pub fn compile(
        pattern: &str,
        kind: FilterKind,
        case_sensitive: bool,
    ) -> Result<Self, FilterError> {
        let compiled = RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| FilterError::new(format!("Invalid regex '{pattern}': {e}")))?;
        Ok(RegexFilter {
            pattern: pattern.to_string(),
            kind,
            case_sensitive,
            compiled,
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.compiled.is_match(text)
    }
}

/// Session state for the regex matrix.
#[derive(Debug, Clone, Default)]
pub struct RegexFilterState {
    pub includes: Vec<RegexFilter>,
    pub excludes: Vec<RegexFilter>,
    pub ands: Vec<RegexFilter>,
}

impl RegexFilterState {
    pub fn has_filters(&self) -> bool {
        !self.includes.is_empty() || !self.excludes.is_empty() || !self.ands.is_empty()
    }

    pub fn clear(&mut self) {
        self.includes.clear();
        self.excludes.clear();
        self.ands.clear();
    }

    /// Add a filter to the list matching its kind.
    pub fn add(&mut self, filter: RegexFilter) {
        match filter.kind {
            FilterKind::Include => self.includes.push(filter),
            FilterKind::Exclude => self.excludes.push(filter),
            FilterKind::And => self.ands.push(filter),
        }
    }

    /// Replace all includes with a single filter.
    pub fn set_include(&mut self, filter: RegexFilter) {
        self.includes = vec![filter];
    }

    /// Check text against the matrix:
    /// 1. if includes exist, at least one must match
    /// 2. any exclude match hides the line
    /// 3. if ANDs exist, all must match
    pub fn should_show(&self, text: &str) -> bool {
        if !self.includes.is_empty() && !self.includes.iter().any(|f| f.matches(text)) {
            return false;
        }

        if self.excludes.iter().any(|f| f.matches(text)) {
            return false;
        }

        if !self.ands.is_empty() && !self.ands.iter().all(|f| f.matches(text)) {
            return false;
        }

        true
    }
}

/// Parse a `/pattern/` or `/pattern/c` argument into `(pattern,
/// case_sensitive)`.
pub fn parse_filter_arg(arg: &str) -> Result<(String, bool), FilterError> {
    if !arg.starts_with('/') {
        return Err(FilterError::new(format!(
            "Filter pattern must start with /: {arg}"
        )));
    }

    let (inner, case_sensitive) = if let Some(stripped) = arg.strip_suffix("/c") {
        if stripped.is_empty() {
            // The token "/c" has no opening delimiter left.
            return Err(FilterError::new(format!(
                "Filter pattern must end with / or /c: {arg}"
            )));
        }
        (&stripped[1..], true)
    } else if let Some(stripped) = arg.strip_suffix('/') {
        if stripped.is_empty() {
            // The bare token "/" has no closing delimiter.
            return Err(FilterError::new(format!(
                "Filter pattern must end with / or /c: {arg}"
            )));
        }
        (&stripped[1..], false)
    } else {
        return Err(FilterError::new(format!(
            "Filter pattern must end with / or /c: {arg}"
        )));
    };

    if inner.is_empty() {
        return Err(FilterError::new("Empty pattern not allowed"));
    }

    Ok((inner.to_string(), case_sensitive))
}

/// Apply one user token to the state.
///
/// A leading `+`, `-` or `&` adds to the include/exclude/AND list; a bare
/// `/pattern/` replaces all previous includes. Invalid tokens leave the
/// state untouched.
pub fn apply_filter_token(state: &mut RegexFilterState, token: &str) -> Result<(), FilterError> {
    let token = token.trim();

    let (kind, rest, replace) = match token.chars().next() {
        Some('+') => (FilterKind::Include, &token[1..], false),
        Some('-') => (FilterKind::Exclude, &token[1..], false),
        Some('&') => (FilterKind::And, &token[1..], false),
        Some('/') => (FilterKind::Include, token, true),
        _ => {
            return Err(FilterError::new(format!(
                "Filter pattern must start with /, +, - or &: {token}"
            )))
        }
    };

    let (pattern, case_sensitive) = parse_filter_arg(rest)?;
    let filter = RegexFilter::compile(&pattern, kind, case_sensitive)?;

    if replace {
        state.set_include(filter);
    } else {
        state.add(filter);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter_arg() {
        assert_eq!(
            parse_filter_arg("/deadlock/").unwrap(),
            ("deadlock".to_string(), false)
        );
        assert_eq!(
            parse_filter_arg("/Deadlock/c").unwrap(),
            ("Deadlock".to_string(), true)
        );
        assert!(parse_filter_arg("deadlock").is_err());
        assert!(parse_filter_arg("/deadlock").is_err());
        assert!(parse_filter_arg("//").is_err());
        assert!(parse_filter_arg("/").is_err());
    }

    #[test]
    fn test_case_insensitive_default() {
        let f = RegexFilter::compile("error", FilterKind::Include, false).unwrap();
        assert!(f.matches("An ERROR happened"));

        let f = RegexFilter::compile("ERROR", FilterKind::Include, true).unwrap();
        assert!(!f.matches("an error happened"));
        assert!(f.matches("an ERROR happened"));
    }

    #[test]
    fn test_include_or_logic() {
        let mut state = RegexFilterState::default();
        apply_filter_token(&mut state, "+/deadlock/").unwrap();
        apply_filter_token(&mut state, "+/timeout/").unwrap();
        assert!(state.should_show("deadlock detected"));
        assert!(state.should_show("statement timeout"));
        assert!(!state.should_show("something else"));
    }

    #[test]
    fn test_bare_include_replaces() {
        let mut state = RegexFilterState::default();
        apply_filter_token(&mut state, "/deadlock/").unwrap();
        apply_filter_token(&mut state, "/timeout/").unwrap();
        assert_eq!(state.includes.len(), 1);
        assert!(!state.should_show("deadlock detected"));
        assert!(state.should_show("statement timeout"));
    }

    #[test]
    fn test_exclude_hides() {
        let mut state = RegexFilterState::default();
        apply_filter_token(&mut state, "-/checkpoint/").unwrap();
        assert!(!state.should_show("checkpoint starting: time"));
        assert!(state.should_show("something else"));
    }

    #[test]
    fn test_and_requires_all() {
        let mut state = RegexFilterState::default();
        apply_filter_token(&mut state, "&/duration/").unwrap();
        apply_filter_token(&mut state, "&/SELECT/").unwrap();
        assert!(state.should_show("duration: 12 ms  statement: SELECT 1"));
        assert!(!state.should_show("duration: 12 ms  statement: UPDATE t"));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let mut state = RegexFilterState::default();
        assert!(apply_filter_token(&mut state, "/((/").is_err());
        assert!(!state.has_filters());
    }
}
