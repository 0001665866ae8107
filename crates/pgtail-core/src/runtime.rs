//! The tail runtime: drives a source through the filter, history,
//! analytics and notification stages and services commands from the UI.
//!
//! One driver thread owns the history buffer and the aggregators; the
//! renderer reads the buffer through a shared lock and receives one-line
//! status events over a channel. Filter changes apply atomically between
//! record admissions and replay over already-ingested records.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use crate::buffer::{HistoryBuffer, StyledLine};
use crate::export::{self, ExportFormat, ExportOptions};
use crate::filter::{
    apply_filter_token, parse_level_spec, parse_time, FilterSet, TimeFilter,
};
use crate::highlight::HighlighterChain;
use crate::model::{LogFormat, LogRecord};
use crate::notify::NotificationEngine;
use crate::source::{LogSource, DEFAULT_NEXT_TIMEOUT};
use crate::stats::{
    extract_duration, ConnectionStats, DurationStats, DurationSummary, ErrorStats,
    SlowQueryConfig,
};

/// Records drained from the source per driver tick before yielding.
const MAX_BATCH: usize = 50;

/// Driver sleep when the source queue is empty.
const IDLE_SLEEP: Duration = Duration::from_millis(10);

/// A time-window change request.
#[derive(Debug, Clone)]
pub enum TimeWindow {
    Since(String),
    Until(String),
    Between(String, String),
    Clear,
}

/// Commands the renderer sends into the driver.
#[derive(Debug, Clone)]
pub enum Command {
    /// Level specification, e.g. `"warning+"` or `"error,fatal"`.
    SetLevels(String),
    /// One regex token: `/p/`, `+/p/`, `-/p/`, `&/p/` (with optional `c`).
    SetRegex(String),
    /// Drop all regex filters.
    ClearRegex,
    SetTimeWindow(TimeWindow),
    /// `field=value` equality filter.
    SetFieldFilter(String),
    /// Remove the filter for one field.
    ClearFieldFilter(String),
    /// Restore the anchor filters; `force` also resets the anchor and
    /// empties the buffer.
    Clear { force: bool },
    Pause,
    Follow,
    JumpHome,
    JumpEnd,
    /// Positive scrolls up (older), negative scrolls down (newer).
    Scroll(i64),
    SetHighlighterConfig(SlowQueryConfig),
    SetHighlighterEnabled(String, bool),
    AddHighlighter {
        name: String,
        pattern: String,
        case_sensitive: bool,
        priority: i32,
    },
    ResetHighlighters,
    ExportBuffer {
        path: PathBuf,
        format: ExportFormat,
        preserve_markup: bool,
    },
    PipeBuffer {
        command: String,
        format: ExportFormat,
    },
    ClearErrorStats,
    ClearConnectionStats,
    Stop,
}

/// One-line status event for the renderer's status line.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub message: String,
}

/// Read-only analytics view handed to the renderer on request.
#[derive(Debug, Clone)]
pub struct AnalyticsSnapshot {
    pub error_count: u64,
    pub warning_count: u64,
    pub errors_by_code: Vec<(String, u64)>,
    pub error_trend: Vec<u64>,
    pub active_connections: usize,
    pub connect_count: u64,
    pub disconnect_count: u64,
    pub failed_count: u64,
    pub durations: DurationSummary,
}

/// The renderer's grip on a running session.
pub struct RuntimeHandle {
    commands: Sender<Command>,
    pub buffer: Arc<Mutex<HistoryBuffer>>,
    status_rx: Receiver<StatusEvent>,
    analytics: Arc<Mutex<Option<AnalyticsSnapshot>>>,
}

impl RuntimeHandle {
    /// Send a command to the driver. Errors only after the driver exited.
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Next pending status line, if any.
    pub fn poll_status(&self) -> Option<StatusEvent> {
        self.status_rx.try_recv().ok()
    }

    /// Latest analytics snapshot published by the driver.
    pub fn analytics(&self) -> Option<AnalyticsSnapshot> {
        self.analytics.lock().ok().and_then(|g| g.clone())
    }
}

/// Owns every pipeline stage and runs the driver loop.
pub struct TailRuntime {
    source: Box<dyn LogSource>,
    filters: FilterSet,
    /// Filter state snapshotted at session start; `clear` restores it.
    anchor: FilterSet,
    buffer: Arc<Mutex<HistoryBuffer>>,
    error_stats: ErrorStats,
    connection_stats: ConnectionStats,
    duration_stats: DurationStats,
    notifications: NotificationEngine,
    highlighters: HighlighterChain,
    commands_rx: Receiver<Command>,
    status_tx: Sender<StatusEvent>,
    observer_rx: Receiver<LogRecord>,
    analytics: Arc<Mutex<Option<AnalyticsSnapshot>>>,
    running: bool,
}

impl TailRuntime {
    /// Wire a source to a fresh runtime. The initial `filters` become the
    /// session anchor.
    pub fn new(
        mut source: Box<dyn LogSource>,
        filters: FilterSet,
        notifications: NotificationEngine,
        highlighters: HighlighterChain,
    ) -> (TailRuntime, RuntimeHandle) {
        let (commands_tx, commands_rx) = mpsc::channel();
        let (status_tx, status_rx) = mpsc::channel();
        let (observer_tx, observer_rx) = mpsc::channel();

        // The observer tap forwards every parsed record (pre-filter) from
        // the source thread to the driver for stats and notifications.
        source.set_observer(Arc::new(move |record: &LogRecord| {
            let _ = observer_tx.send(record.clone());
        }));
        source.set_filters(filters.clone());

        let mut buffer = HistoryBuffer::default();
        buffer.update_filters(filters.clone());
        let buffer = Arc::new(Mutex::new(buffer));
        let analytics = Arc::new(Mutex::new(None));

        let handle = RuntimeHandle {
            commands: commands_tx,
            buffer: Arc::clone(&buffer),
            status_rx,
            analytics: Arc::clone(&analytics),
        };

        let runtime = TailRuntime {
            source,
            anchor: filters.clone(),
            filters,
            buffer,
            error_stats: ErrorStats::new(),
            connection_stats: ConnectionStats::new(),
            duration_stats: DurationStats::new(),
            notifications,
            highlighters,
            commands_rx,
            status_tx,
            observer_rx,
            analytics,
            running: false,
        };

        (runtime, handle)
    }

    /// Run the driver loop until `Command::Stop` or the UI hangs up.
    pub fn run(mut self) {
        self.source.start();
        self.running = true;

        while self.running {
            self.drain_commands();
            self.drain_observer_tap();
            let drained = self.drain_source();
            self.publish_analytics();

            if drained == 0 {
                std::thread::sleep(IDLE_SLEEP);
            }
        }

        self.source.stop();
    }

    /// Spawn the driver on its own thread.
    pub fn spawn(self) -> JoinHandle<()> {
        std::thread::spawn(move || self.run())
    }

    fn status(&self, message: impl Into<String>) {
        let _ = self.status_tx.send(StatusEvent {
            message: message.into(),
        });
    }

    fn drain_commands(&mut self) {
        loop {
            match self.commands_rx.try_recv() {
                Ok(command) => self.handle_command(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // UI is gone; shut the session down.
                    self.running = false;
                    break;
                }
            }
        }
    }

    /// Feed stats and the notification engine with every parsed record.
    fn drain_observer_tap(&mut self) {
        while let Ok(record) = self.observer_rx.try_recv() {
            self.error_stats.add(&record);
            self.connection_stats.add(&record);
            if let Some(duration) = extract_duration(&record.message) {
                self.duration_stats.add(duration);
            }
            self.notifications.check(&record, &self.error_stats);
        }
    }

    /// Move filter-passing records from the source into the buffer,
    /// bounded per tick so rendering stays responsive.
    fn drain_source(&mut self) -> usize {
        let mut drained = 0;

        while drained < MAX_BATCH {
            let Some(record) = self.source.next_record(DEFAULT_NEXT_TIMEOUT) else {
                break;
            };

            let lines = self.render_record(&record);
            if let Ok(mut buffer) = self.buffer.lock() {
                buffer.append(record, lines);
            }
            drained += 1;
        }

        drained
    }

    fn render_record(&self, record: &LogRecord) -> Vec<StyledLine> {
        record
            .raw
            .split('\n')
            .map(|segment| self.highlighters.render(segment))
            .collect()
    }

    /// Push the current filters into the source and replay them over the
    /// buffer so already-ingested records reflect the change immediately.
    fn push_filters(&mut self) {
        self.source.set_filters(self.filters.clone());
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.update_filters(self.filters.clone());
        }
    }

    /// Re-render every buffered record after a highlighter change,
    /// leaving scroll state alone.
    fn rerender_buffer(&mut self) {
        let highlighters = &self.highlighters;
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.rerender_with(|record| {
                record
                    .raw
                    .split('\n')
                    .map(|segment| highlighters.render(segment))
                    .collect()
            });
        }
    }

    fn publish_analytics(&mut self) {
        let snapshot = AnalyticsSnapshot {
            error_count: self.error_stats.error_count,
            warning_count: self.error_stats.warning_count,
            errors_by_code: self.error_stats.by_code(),
            error_trend: self.error_stats.trend_buckets(60),
            active_connections: self.connection_stats.active_count(),
            connect_count: self.connection_stats.connect_count,
            disconnect_count: self.connection_stats.disconnect_count,
            failed_count: self.connection_stats.failed_count,
            durations: self.duration_stats.summary(),
        };
        if let Ok(mut guard) = self.analytics.lock() {
            *guard = Some(snapshot);
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetLevels(spec) => {
                let (levels, invalid) = parse_level_spec(&spec);
                if !invalid.is_empty() {
                    self.status(format!("Unknown level(s): {}", invalid.join(", ")));
                    return;
                }
                self.filters.levels = levels;
                self.push_filters();
            }
            Command::SetRegex(token) => {
                match apply_filter_token(&mut self.filters.regex, &token) {
                    Ok(()) => self.push_filters(),
                    Err(e) => self.status(e.to_string()),
                }
            }
            Command::ClearRegex => {
                self.filters.regex.clear();
                self.push_filters();
            }
            Command::SetTimeWindow(window) => self.set_time_window(window),
            Command::SetFieldFilter(spec) => {
                match self.filters.fields.add_spec(&spec) {
                    Ok(()) => {
                        if self.source.detected_format() == Some(LogFormat::Text) {
                            self.status(
                                "Field filters match only CSV/JSON logs; this source is text",
                            );
                        }
                        self.push_filters();
                    }
                    Err(e) => self.status(e.to_string()),
                }
            }
            Command::ClearFieldFilter(field) => {
                if self.filters.fields.remove(&field) {
                    self.push_filters();
                } else {
                    self.status(format!("No active filter for field: {field}"));
                }
            }
            Command::Clear { force } => {
                if force {
                    self.filters = FilterSet::default();
                    self.anchor = FilterSet::default();
                    if let Ok(mut buffer) = self.buffer.lock() {
                        buffer.clear();
                    }
                } else {
                    self.filters = self.anchor.clone();
                }
                self.push_filters();
            }
            Command::Pause => {
                if let Ok(mut buffer) = self.buffer.lock() {
                    buffer.set_paused();
                }
            }
            Command::Follow => {
                if let Ok(mut buffer) = self.buffer.lock() {
                    buffer.resume_follow();
                }
            }
            Command::JumpHome => {
                if let Ok(mut buffer) = self.buffer.lock() {
                    buffer.scroll_to_top();
                }
            }
            Command::JumpEnd => {
                if let Ok(mut buffer) = self.buffer.lock() {
                    buffer.resume_follow();
                }
            }
            Command::Scroll(lines) => {
                if let Ok(mut buffer) = self.buffer.lock() {
                    if lines > 0 {
                        buffer.scroll_up(lines as usize);
                    } else if lines < 0 {
                        buffer.scroll_down(lines.unsigned_abs() as usize);
                    }
                }
            }
            Command::SetHighlighterConfig(config) => {
                match SlowQueryConfig::validate(
                    config.warn_ms,
                    config.slow_ms,
                    config.critical_ms,
                ) {
                    Ok(()) => {
                        self.highlighters.set_duration_config(config);
                        self.rerender_buffer();
                    }
                    Err(e) => self.status(e),
                }
            }
            Command::SetHighlighterEnabled(name, enabled) => {
                if self.highlighters.set_enabled(&name, enabled) {
                    self.rerender_buffer();
                } else {
                    self.status(format!("Unknown highlighter: {name}"));
                }
            }
            Command::AddHighlighter {
                name,
                pattern,
                case_sensitive,
                priority,
            } => match self
                .highlighters
                .add_custom(&name, &pattern, case_sensitive, priority)
            {
                Ok(()) => self.rerender_buffer(),
                Err(e) => self.status(e.to_string()),
            },
            Command::ResetHighlighters => {
                self.highlighters.reset();
                self.rerender_buffer();
            }
            Command::ExportBuffer {
                path,
                format,
                preserve_markup,
            } => self.export_buffer(path, format, preserve_markup),
            Command::PipeBuffer { command, format } => self.pipe_buffer(&command, format),
            Command::ClearErrorStats => {
                self.error_stats.clear();
                self.status("Error statistics cleared");
            }
            Command::ClearConnectionStats => {
                self.connection_stats.clear();
                self.status("Connection statistics cleared");
            }
            Command::Stop => {
                self.running = false;
            }
        }
    }

    fn set_time_window(&mut self, window: TimeWindow) {
        let result = match &window {
            TimeWindow::Since(spec) => {
                parse_time(spec).map(|dt| TimeFilter::since(dt, spec))
            }
            TimeWindow::Until(spec) => {
                parse_time(spec).map(|dt| TimeFilter::until(dt, spec))
            }
            TimeWindow::Between(a, b) => parse_time(a).and_then(|since| {
                parse_time(b).and_then(|until| {
                    TimeFilter::between(since, until, &format!("{a} {b}"))
                })
            }),
            TimeWindow::Clear => Ok(TimeFilter::default()),
        };

        match result {
            Ok(filter) => {
                // An upper bound means no future record can pass; drop out
                // of follow-to-newest.
                let pause = filter.has_upper_bound();
                self.filters.time = filter;
                self.push_filters();
                if pause {
                    if let Ok(mut buffer) = self.buffer.lock() {
                        buffer.set_paused();
                    }
                }
            }
            Err(e) => self.status(e.to_string()),
        }
    }

    fn passing_entries(&self) -> Vec<export::ExportEntry> {
        match self.buffer.lock() {
            Ok(buffer) => buffer
                .entries()
                .filter(|e| e.passes_filter)
                .map(|e| (e.record.clone(), e.lines.clone()))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn export_buffer(&mut self, path: PathBuf, format: ExportFormat, preserve_markup: bool) {
        let entries = self.passing_entries();
        let mut options = ExportOptions::new(path.clone(), format);
        options.preserve_markup = preserve_markup;

        match export::export_entries(&entries, &options) {
            Ok(written) => {
                debug!(path = %path.display(), written, "buffer exported");
                self.status(format!("Exported {written} records to {}", path.display()));
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "export failed");
                self.status(format!("Export failed: {e}"));
            }
        }
    }

    fn pipe_buffer(&mut self, command: &str, format: ExportFormat) {
        let entries = self.passing_entries();
        match export::pipe_entries(command, &entries, format) {
            Ok((written, status)) if status.success() => {
                self.status(format!("Piped {written} records to: {command}"));
            }
            Ok((_, status)) => {
                self.status(format!("Command exited with {status}: {command}"));
            }
            Err(e) => {
                warn!(command, error = %e, "pipe failed");
                self.status(format!("Pipe failed: {e}"));
            }
        }
    }
}
