//! Multi-file fan-in: tails N files (optionally discovered from a glob
//! pattern) and merges their records in timestamp order within each
//! polling tick.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::{mpsc, Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::filter::FilterSet;
use crate::model::LogRecord;

use super::file_state::TailedFile;
use super::glob::GlobPattern;
use super::{LogSource, RecordObserver, DEFAULT_BUFFER_CAPACITY, DEFAULT_POLL_INTERVAL};

/// How often the glob pattern is re-scanned for new files.
const GLOB_RESCAN_INTERVAL: Duration = Duration::from_secs(5);

/// Tails multiple files with per-tick timestamp-ordered interleaving.
///
/// Each file keeps independent tail state. Per polling tick all per-file
/// reads are drained, stable-sorted by `(timestamp, source_name)` (records
/// without timestamps sort first) and emitted in that order. There is no
/// ordering guarantee across ticks.
pub struct MultiTailer {
    initial_paths: Vec<PathBuf>,
    glob: Option<GlobPattern>,
    poll_interval: Duration,
    filters: Arc<RwLock<FilterSet>>,
    observer: Option<RecordObserver>,
    buffer: Arc<Mutex<VecDeque<LogRecord>>>,
    buffer_capacity: usize,
    unavailable: Arc<Mutex<Vec<PathBuf>>>,
    tailed_paths: Arc<Mutex<Vec<PathBuf>>>,
    stop_flag: Arc<AtomicBool>,
    rx: Option<Receiver<LogRecord>>,
    handle: Option<JoinHandle<()>>,
}

impl MultiTailer {
    /// New fan-in over explicit paths, plus an optional glob pattern that
    /// is re-scanned for newly appearing files.
    pub fn new(paths: Vec<PathBuf>, glob: Option<GlobPattern>, filters: FilterSet) -> Self {
        MultiTailer {
            initial_paths: paths,
            glob,
            poll_interval: DEFAULT_POLL_INTERVAL,
            filters: Arc::new(RwLock::new(filters)),
            observer: None,
            buffer: Arc::new(Mutex::new(VecDeque::new())),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            unavailable: Arc::new(Mutex::new(Vec::new())),
            tailed_paths: Arc::new(Mutex::new(Vec::new())),
            stop_flag: Arc::new(AtomicBool::new(false)),
            rx: None,
            handle: None,
        }
    }

    /// Override the polling interval (mainly for tests).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Paths currently under tail.
    pub fn tailed_paths(&self) -> Vec<PathBuf> {
        self.tailed_paths
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

impl LogSource for MultiTailer {
    fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }

        self.stop_flag.store(false, Ordering::SeqCst);
        let (tx, rx) = mpsc::sync_channel(self.buffer_capacity);
        self.rx = Some(rx);

        let time_filtered = self
            .filters
            .read()
            .map(|f| f.time.is_active())
            .unwrap_or(false);

        let mut states: HashMap<PathBuf, TailedFile> = HashMap::new();
        for path in &self.initial_paths {
            let mut state = TailedFile::new(path.clone());
            if time_filtered {
                state.seek_to_start();
            } else {
                state.seek_to_end();
            }
            states.insert(path.clone(), state);
        }

        let worker = FanInWorker {
            states,
            glob: self.glob.clone(),
            last_glob_scan: None,
            filters: Arc::clone(&self.filters),
            observer: self.observer.clone(),
            buffer: Arc::clone(&self.buffer),
            buffer_capacity: self.buffer_capacity,
            unavailable: Arc::clone(&self.unavailable),
            tailed_paths: Arc::clone(&self.tailed_paths),
            stop_flag: Arc::clone(&self.stop_flag),
            poll_interval: self.poll_interval,
            tx,
        };

        self.handle = Some(std::thread::spawn(move || worker.run()));
    }

    fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn next_record(&mut self, timeout: Duration) -> Option<LogRecord> {
        self.rx.as_ref()?.recv_timeout(timeout).ok()
    }

    fn buffer_snapshot(&self) -> Vec<LogRecord> {
        self.buffer
            .lock()
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn set_filters(&self, filters: FilterSet) {
        if let Ok(mut guard) = self.filters.write() {
            *guard = filters;
        }
    }

    fn set_observer(&mut self, observer: RecordObserver) {
        self.observer = Some(observer);
    }

    fn unavailable_paths(&self) -> Vec<PathBuf> {
        self.unavailable
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

impl Drop for MultiTailer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct FanInWorker {
    states: HashMap<PathBuf, TailedFile>,
    glob: Option<GlobPattern>,
    last_glob_scan: Option<Instant>,
    filters: Arc<RwLock<FilterSet>>,
    observer: Option<RecordObserver>,
    buffer: Arc<Mutex<VecDeque<LogRecord>>>,
    buffer_capacity: usize,
    unavailable: Arc<Mutex<Vec<PathBuf>>>,
    tailed_paths: Arc<Mutex<Vec<PathBuf>>>,
    stop_flag: Arc<AtomicBool>,
    poll_interval: Duration,
    tx: SyncSender<LogRecord>,
}

impl FanInWorker {
    fn run(mut self) {
        while !self.stop_flag.load(Ordering::SeqCst) {
            self.rescan_glob();

            // Drain every file, then merge this tick's records.
            let mut tick_records: Vec<LogRecord> = Vec::new();
            for state in self.states.values_mut() {
                tick_records.extend(state.read_new_records());
            }

            self.publish_status();

            // Stable sort: records without timestamps first, then by
            // timestamp, ties broken by source name.
            tick_records.sort_by(|a, b| {
                let key = |r: &LogRecord| {
                    (
                        r.timestamp.unwrap_or(DateTime::<Utc>::MIN_UTC),
                        r.source_name.clone().unwrap_or_default(),
                    )
                };
                key(a).cmp(&key(b))
            });

            for record in tick_records {
                if let Some(observer) = &self.observer {
                    observer(&record);
                }

                let passes = self
                    .filters
                    .read()
                    .map(|f| f.should_show(&record))
                    .unwrap_or(true);
                if !passes {
                    continue;
                }

                if let Ok(mut buffer) = self.buffer.lock() {
                    if buffer.len() >= self.buffer_capacity {
                        buffer.pop_front();
                    }
                    buffer.push_back(record.clone());
                }

                if !self.send_with_backpressure(record) {
                    return;
                }
            }

            std::thread::sleep(self.poll_interval);
        }
    }

    /// Re-expand the glob pattern (rate-limited) and pick up new files.
    /// Newly discovered files seek to end, or to start when time-filtered.
    fn rescan_glob(&mut self) {
        let Some(glob) = &self.glob else {
            return;
        };

        let due = self
            .last_glob_scan
            .is_none_or(|t| t.elapsed() >= GLOB_RESCAN_INTERVAL);
        if !due {
            return;
        }
        self.last_glob_scan = Some(Instant::now());

        let time_filtered = self
            .filters
            .read()
            .map(|f| f.time.is_active())
            .unwrap_or(false);

        for path in glob.expand() {
            if self.states.contains_key(&path) {
                continue;
            }
            let mut state = TailedFile::new(path.clone());
            if time_filtered {
                state.seek_to_start();
            } else {
                state.seek_to_end();
            }
            self.states.insert(path, state);
        }
    }

    fn publish_status(&self) {
        if let Ok(mut unavailable) = self.unavailable.lock() {
            *unavailable = self
                .states
                .values()
                .filter(|s| s.is_unavailable())
                .map(|s| s.path().to_path_buf())
                .collect();
        }
        if let Ok(mut paths) = self.tailed_paths.lock() {
            *paths = self.states.keys().cloned().collect();
        }
    }

    fn send_with_backpressure(&self, record: LogRecord) -> bool {
        let mut pending = record;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return true,
                Err(TrySendError::Disconnected(_)) => return false,
                Err(TrySendError::Full(rec)) => {
                    if self.stop_flag.load(Ordering::SeqCst) {
                        return false;
                    }
                    pending = rec;
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn collect_records(tailer: &mut MultiTailer, want: usize) -> Vec<LogRecord> {
        let mut out = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(2);
        while out.len() < want && Instant::now() < deadline {
            if let Some(rec) = tailer.next_record(Duration::from_millis(50)) {
                out.push(rec);
            }
        }
        out
    }

    #[test]
    fn test_merges_two_files_in_timestamp_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.log");
        let b = dir.path().join("b.log");
        std::fs::write(&a, "").unwrap();
        std::fs::write(&b, "").unwrap();

        let mut tailer = MultiTailer::new(vec![a.clone(), b.clone()], None, FilterSet::default())
            .with_poll_interval(Duration::from_millis(200));
        tailer.start();

        // Let the first (empty) poll pass, then write interleaved
        // timestamps within one poll window.
        std::thread::sleep(Duration::from_millis(50));
        let mut fa = std::fs::OpenOptions::new().append(true).open(&a).unwrap();
        let mut fb = std::fs::OpenOptions::new().append(true).open(&b).unwrap();
        writeln!(fa, "2024-01-15 10:00:02 UTC [1] LOG:  third").unwrap();
        writeln!(fb, "2024-01-15 10:00:01 UTC [2] LOG:  second").unwrap();
        writeln!(fa, "2024-01-15 10:00:03 UTC [1] LOG:  fourth").unwrap();
        writeln!(fb, "2024-01-15 10:00:00 UTC [2] LOG:  first").unwrap();
        drop(fa);
        drop(fb);

        let records = collect_records(&mut tailer, 4);
        tailer.stop();

        let messages: Vec<&str> = records.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third", "fourth"]);
    }

    #[test]
    fn test_null_timestamps_sort_first() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.log");
        std::fs::write(&a, "").unwrap();

        let mut tailer = MultiTailer::new(vec![a.clone()], None, FilterSet::default())
            .with_poll_interval(Duration::from_millis(200));
        tailer.start();
        std::thread::sleep(Duration::from_millis(50));

        let mut fa = std::fs::OpenOptions::new().append(true).open(&a).unwrap();
        writeln!(fa, "2024-01-15 10:00:00 UTC [1] LOG:  stamped").unwrap();
        writeln!(fa, "bare continuation line").unwrap();
        drop(fa);

        let records = collect_records(&mut tailer, 2);
        tailer.stop();

        assert_eq!(records[0].message, "bare continuation line");
        assert_eq!(records[1].message, "stamped");
    }

    #[test]
    fn test_glob_discovers_new_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("one.log");
        std::fs::write(&first, "").unwrap();

        let glob = GlobPattern::from_path(&format!("{}/*.log", dir.path().display()));
        let mut tailer = MultiTailer::new(vec![first], Some(glob), FilterSet::default())
            .with_poll_interval(Duration::from_millis(10));
        tailer.start();

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(tailer.tailed_paths().len(), 1);

        // The rescan happens every few seconds in production; this test
        // only checks that an initial scan registered the pattern's
        // matches, so a second file written now is found on the next
        // rescan boundary.
        std::fs::write(dir.path().join("two.log"), "").unwrap();
        tailer.stop();
    }
}
