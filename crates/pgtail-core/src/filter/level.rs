//! User-facing level specifications.
//!
//! A specification is one of `LEVEL`, `LEVEL+` (that level and all more
//! severe), `LEVEL-` (that level and all less severe), `ALL`, or a
//! comma/space-separated combination of those.

use std::collections::HashSet;

use crate::model::LogLevel;

/// Parse a list of level arguments into an active-level set.
///
/// Returns `(levels, invalid)` where `levels` is `None` for "show all"
/// (empty input or `ALL`, or when nothing valid remained) and `invalid`
/// lists the arguments that did not name a level.
pub fn parse_levels(args: &[&str]) -> (Option<HashSet<LogLevel>>, Vec<String>) {
    if args.is_empty() {
        return (None, Vec::new());
    }

    if args.len() == 1 && args[0].eq_ignore_ascii_case("ALL") {
        return (None, Vec::new());
    }

    let mut levels: HashSet<LogLevel> = HashSet::new();
    let mut invalid: Vec<String> = Vec::new();

    for arg in args {
        let trimmed = arg.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(name) = trimmed.strip_suffix('+') {
            match name.parse::<LogLevel>() {
                Ok(level) => levels.extend(LogLevel::at_or_above(level)),
                Err(_) => invalid.push(trimmed.to_string()),
            }
        } else if let Some(name) = trimmed.strip_suffix('-') {
            match name.parse::<LogLevel>() {
                Ok(level) => levels.extend(LogLevel::at_or_below(level)),
                Err(_) => invalid.push(trimmed.to_string()),
            }
        } else {
            match trimmed.parse::<LogLevel>() {
                Ok(level) => {
                    levels.insert(level);
                }
                Err(_) => invalid.push(trimmed.to_string()),
            }
        }
    }

    if levels.is_empty() {
        return (None, invalid);
    }

    (Some(levels), invalid)
}

/// Parse a single specification string, splitting on commas and whitespace.
pub fn parse_level_spec(spec: &str) -> (Option<HashSet<LogLevel>>, Vec<String>) {
    let parts: Vec<&str> = spec
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect();
    parse_levels(&parts)
}
