//! pgtail - Interactive log tailer for PostgreSQL servers.
//!
//! Tails one or more server log files (or stdin), parses the text, csvlog
//! and jsonlog formats into uniform records, and renders them in an
//! interactive terminal session with filtering, highlighting and
//! session-scoped analytics.
//!
//! Usage:
//!   pgtail /var/log/postgresql/postgresql-16-main.log
//!   pgtail '/var/log/postgresql/*.log'      # glob, merged by timestamp
//!   pgtail --levels warning+ server.log
//!   pgtail --filter '/deadlock/' server.log
//!   zcat old.log.gz | pgtail --stdin

mod tui;

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use pgtail_core::config::{apply_config, SessionDefaults};
use pgtail_core::filter::{apply_filter_token, parse_level_spec, parse_time, FilterSet, TimeFilter};
use pgtail_core::highlight::HighlighterChain;
use pgtail_core::notify::{NoOpNotifier, NotificationEngine};
use pgtail_core::runtime::TailRuntime;
use pgtail_core::source::{
    is_glob_pattern, FileTailer, GlobPattern, LogSource, MultiTailer, StdinSource,
};

/// Interactive PostgreSQL log tailer.
#[derive(Parser)]
#[command(name = "pgtail", about = "Interactive PostgreSQL log tailer", version)]
struct Args {
    /// Log files or glob patterns to tail.
    #[arg(value_name = "FILE")]
    files: Vec<String>,

    /// Read from standard input instead of files.
    #[arg(long)]
    stdin: bool,

    /// Initial level filter, e.g. "warning+" or "error,fatal".
    #[arg(short = 'l', long, value_name = "SPEC")]
    levels: Option<String>,

    /// Initial regex filter token: /pattern/, +/p/, -/p/ or &/p/.
    #[arg(short = 'f', long = "filter", value_name = "TOKEN")]
    filters: Vec<String>,

    /// Only show records at or after this time (5m, 14:30, ISO 8601).
    #[arg(long, value_name = "TIME")]
    since: Option<String>,

    /// Only show records at or before this time.
    #[arg(long, value_name = "TIME")]
    until: Option<String>,

    /// Structured field filter, e.g. db=prod (repeatable).
    #[arg(long = "field", value_name = "FIELD=VALUE")]
    fields: Vec<String>,

    /// Configuration overrides as key=value (repeatable).
    #[arg(long = "set", value_name = "KEY=VALUE")]
    config: Vec<String>,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level.to_string())),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn build_filters(args: &Args, defaults: &SessionDefaults) -> Result<FilterSet, String> {
    let mut filters = FilterSet::default();
    filters.levels = defaults.levels.clone();

    if let Some(spec) = &args.levels {
        let (levels, invalid) = parse_level_spec(spec);
        if !invalid.is_empty() {
            return Err(format!("Unknown level(s): {}", invalid.join(", ")));
        }
        filters.levels = levels;
    }

    for token in &args.filters {
        apply_filter_token(&mut filters.regex, token).map_err(|e| e.to_string())?;
    }

    match (&args.since, &args.until) {
        (Some(a), Some(b)) => {
            let since = parse_time(a).map_err(|e| e.to_string())?;
            let until = parse_time(b).map_err(|e| e.to_string())?;
            filters.time = TimeFilter::between(since, until, &format!("{a} {b}"))
                .map_err(|e| e.to_string())?;
        }
        (Some(a), None) => {
            filters.time = TimeFilter::since(parse_time(a).map_err(|e| e.to_string())?, a);
        }
        (None, Some(b)) => {
            filters.time = TimeFilter::until(parse_time(b).map_err(|e| e.to_string())?, b);
        }
        (None, None) => {}
    }

    for spec in &args.fields {
        filters.fields.add_spec(spec).map_err(|e| e.to_string())?;
    }

    Ok(filters)
}

fn build_source(args: &Args, filters: &FilterSet) -> Result<Box<dyn LogSource>, String> {
    if args.stdin {
        return Ok(Box::new(StdinSource::new(filters.clone())));
    }

    if args.files.is_empty() {
        return Err("No log file given. Pass a file, a glob pattern, or --stdin.".to_string());
    }

    let has_glob = args.files.iter().any(|f| is_glob_pattern(f));
    if args.files.len() == 1 && !has_glob {
        let path = PathBuf::from(&args.files[0]);
        if !path.exists() {
            return Err(format!("File not found: {}", path.display()));
        }
        return Ok(Box::new(FileTailer::new(path, filters.clone())));
    }

    let mut paths: Vec<PathBuf> = Vec::new();
    let mut glob: Option<GlobPattern> = None;
    for file in &args.files {
        if is_glob_pattern(file) {
            let pattern = GlobPattern::from_path(file);
            paths.extend(pattern.expand_or_error()?);
            // The rescan loop watches the first glob for new files.
            if glob.is_none() {
                glob = Some(pattern);
            }
        } else {
            paths.push(PathBuf::from(file));
        }
    }

    Ok(Box::new(MultiTailer::new(paths, glob, filters.clone())))
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose, args.quiet);

    let mut config_map = HashMap::new();
    for entry in &args.config {
        match entry.split_once('=') {
            Some((key, value)) => {
                config_map.insert(key.trim().to_string(), value.trim().to_string());
            }
            None => {
                eprintln!("Error: --set expects key=value, got '{entry}'");
                return ExitCode::FAILURE;
            }
        }
    }
    let (defaults, warnings) = apply_config(&config_map);
    for warning in &warnings {
        eprintln!("config: {warning}");
    }

    let filters = match build_filters(&args, &defaults) {
        Ok(filters) => filters,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let source = match build_source(&args, &filters) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Platform toast dispatch lives outside the core; the engine still
    // evaluates rules so the status line can show matches.
    let engine = NotificationEngine::new(
        Box::new(NoOpNotifier::new("no platform notifier wired")),
        defaults.notifications.clone(),
    );

    let mut chain = HighlighterChain::new(defaults.slow);
    for (name, enabled) in &defaults.enabled_highlighters {
        chain.set_enabled(name, *enabled);
    }

    let start_following = defaults.follow && !filters.time.has_upper_bound();

    let (runtime, handle) = TailRuntime::new(source, filters, engine, chain);
    let driver = runtime.spawn();

    let app = tui::App::new(handle, start_following);
    let result = app.run();

    // The app sends Stop on exit; wait for the driver to wind down.
    let _ = driver.join();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
