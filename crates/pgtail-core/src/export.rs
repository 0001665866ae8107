//! Export and pipe of buffered records.
//!
//! TEXT writes the raw line (optionally with ANSI style markup preserved);
//! JSON writes one object per line with a fixed schema; CSV writes a
//! header plus quoted rows. JSON and CSV always strip style markup.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;

use crate::buffer::StyledLine;
use crate::highlight::HighlightStyle;
use crate::model::LogRecord;

/// Supported export output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Raw log line.
    Text,
    /// JSONL, one object per line.
    Json,
    /// CSV with a header row.
    Csv,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(ExportFormat::Text),
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(format!(
                "Unknown format '{other}'. Valid formats: text, json, csv"
            )),
        }
    }
}

/// CSV header used for exports.
pub const CSV_HEADER: &str = "timestamp,level,pid,message";

/// Configuration for an export operation.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub path: PathBuf,
    pub format: ExportFormat,
    pub follow: bool,
    pub append: bool,
    pub since: Option<DateTime<Utc>>,
    /// TEXT format only: keep ANSI style markup in the output.
    pub preserve_markup: bool,
}

impl ExportOptions {
    pub fn new(path: PathBuf, format: ExportFormat) -> Self {
        ExportOptions {
            path,
            format,
            follow: false,
            append: false,
            since: None,
            preserve_markup: false,
        }
    }

    /// Validation diagnostics; empty when the options are consistent.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.follow && self.append {
            errors.push("Cannot use --follow with --append".to_string());
        }
        errors
    }
}

fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        .unwrap_or_default()
}

/// Format a record as a JSONL object with the fixed export schema.
pub fn format_json_record(record: &LogRecord) -> String {
    json!({
        "timestamp": record.timestamp.map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        "level": record.level.name(),
        "pid": record.pid,
        "message": record.message,
    })
    .to_string()
}

/// Quote a CSV field minimally (only when it contains `,`, `"` or a
/// newline).
fn csv_quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Format a record as a CSV row matching [`CSV_HEADER`].
pub fn format_csv_record(record: &LogRecord) -> String {
    let pid = record.pid.map(|p| p.to_string()).unwrap_or_default();
    format!(
        "{},{},{},{}",
        csv_quote(&format_timestamp(record.timestamp)),
        record.level.name(),
        pid,
        csv_quote(&record.message),
    )
}

/// ANSI escape for a highlight style (markup-preserving TEXT export).
fn ansi_code(style: &HighlightStyle) -> &'static str {
    match style {
        HighlightStyle::SqlKeyword => "\x1b[36m",
        HighlightStyle::Timestamp => "\x1b[90m",
        HighlightStyle::Number => "\x1b[35m",
        HighlightStyle::StringLiteral => "\x1b[32m",
        HighlightStyle::SqlState => "\x1b[33m",
        HighlightStyle::DurationWarning => "\x1b[33m",
        HighlightStyle::DurationSlow => "\x1b[1;33m",
        HighlightStyle::DurationCritical => "\x1b[1;31m",
        HighlightStyle::Custom(_) => "\x1b[34m",
    }
}

const ANSI_RESET: &str = "\x1b[0m";

/// Render styled lines to a single TEXT line with ANSI markup.
pub fn format_markup_line(lines: &[StyledLine]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        for (style, text) in line {
            match style {
                Some(style) => {
                    out.push_str(ansi_code(style));
                    out.push_str(text);
                    out.push_str(ANSI_RESET);
                }
                None => out.push_str(text),
            }
        }
    }
    out
}

/// One exportable entry: the record plus its rendered lines (used only
/// for markup-preserving TEXT output).
pub type ExportEntry = (LogRecord, Vec<StyledLine>);

fn format_entry(entry: &ExportEntry, format: ExportFormat, preserve_markup: bool) -> String {
    match format {
        ExportFormat::Text => {
            if preserve_markup {
                format_markup_line(&entry.1)
            } else {
                entry.0.raw.clone()
            }
        }
        ExportFormat::Json => format_json_record(&entry.0),
        ExportFormat::Csv => format_csv_record(&entry.0),
    }
}

/// Write entries to the file named by the options. Returns the number of
/// records written.
pub fn export_entries(entries: &[ExportEntry], options: &ExportOptions) -> io::Result<usize> {
    if let Some(parent) = options.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(options.append)
        .truncate(!options.append)
        .open(&options.path)?;
    let mut writer = BufWriter::new(file);

    let written = write_entries(&mut writer, entries, options)?;
    writer.flush()?;
    Ok(written)
}

/// Write entries to an arbitrary sink (used by pipe and follow modes).
pub fn write_entries<W: Write>(
    writer: &mut W,
    entries: &[ExportEntry],
    options: &ExportOptions,
) -> io::Result<usize> {
    // The CSV header leads every fresh file, but not appended output.
    if options.format == ExportFormat::Csv && !options.append {
        writeln!(writer, "{CSV_HEADER}")?;
    }

    let mut written = 0;
    for entry in entries {
        if let Some(since) = options.since {
            if let Some(ts) = entry.0.timestamp {
                if ts < since {
                    continue;
                }
            }
        }
        writeln!(writer, "{}", format_entry(entry, options.format, options.preserve_markup))?;
        written += 1;
    }

    Ok(written)
}

/// Stream filter-passing records from a live source into a sink until
/// `stop` is raised or the source completes. Used by `--follow` exports;
/// markup is never preserved because no rendered lines exist yet.
pub fn export_follow<W: Write>(
    source: &mut dyn crate::source::LogSource,
    writer: &mut W,
    format: ExportFormat,
    stop: &std::sync::atomic::AtomicBool,
) -> io::Result<usize> {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    if format == ExportFormat::Csv {
        writeln!(writer, "{CSV_HEADER}")?;
    }

    let mut written = 0;
    while !stop.load(Ordering::SeqCst) {
        let Some(record) = source.next_record(Duration::from_millis(100)) else {
            if source.is_complete() {
                break;
            }
            continue;
        };

        let line = match format {
            ExportFormat::Text => record.raw.clone(),
            ExportFormat::Json => format_json_record(&record),
            ExportFormat::Csv => format_csv_record(&record),
        };
        writeln!(writer, "{line}")?;
        writer.flush()?;
        written += 1;
    }

    Ok(written)
}

/// Pipe entries through a shell command's stdin. Returns the number of
/// records written and the command's exit status.
pub fn pipe_entries(
    command: &str,
    entries: &[ExportEntry],
    format: ExportFormat,
) -> io::Result<(usize, std::process::ExitStatus)> {
    if command.trim().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Command cannot be empty",
        ));
    }

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .spawn()?;

    let options = ExportOptions {
        path: PathBuf::new(),
        format,
        follow: false,
        append: false,
        since: None,
        preserve_markup: false,
    };

    let written = match child.stdin.take() {
        Some(stdin) => {
            let mut writer = BufWriter::new(stdin);
            let written = write_entries(&mut writer, entries, &options)?;
            writer.flush()?;
            written
        }
        None => 0,
    };

    let status = child.wait()?;
    Ok((written, status))
}
