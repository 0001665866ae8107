//! Single-file tailer: one polling thread per file, surviving rotation.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::{mpsc, Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::filter::FilterSet;
use crate::model::{LogFormat, LogRecord};

use super::file_state::TailedFile;
use super::{LogSource, RecordObserver, DEFAULT_BUFFER_CAPACITY, DEFAULT_POLL_INTERVAL};

/// Tails one log file on a background thread.
///
/// Constructed in stopped state. `start` seeks to end-of-file (start-of-
/// file when a time filter is active, so historical records can satisfy
/// the window) and spawns the poll loop. Filter-passing records flow
/// through a bounded queue to `next_record` and into a bounded in-memory
/// history.
pub struct FileTailer {
    path: PathBuf,
    poll_interval: Duration,
    filters: Arc<RwLock<FilterSet>>,
    observer: Option<RecordObserver>,
    buffer: Arc<Mutex<VecDeque<LogRecord>>>,
    buffer_capacity: usize,
    unavailable: Arc<AtomicBool>,
    format: Arc<Mutex<Option<LogFormat>>>,
    stop_flag: Arc<AtomicBool>,
    rx: Option<Receiver<LogRecord>>,
    handle: Option<JoinHandle<()>>,
}

impl FileTailer {
    /// New tailer in stopped state.
    pub fn new(path: PathBuf, filters: FilterSet) -> Self {
        FileTailer {
            path,
            poll_interval: DEFAULT_POLL_INTERVAL,
            filters: Arc::new(RwLock::new(filters)),
            observer: None,
            buffer: Arc::new(Mutex::new(VecDeque::new())),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            unavailable: Arc::new(AtomicBool::new(false)),
            format: Arc::new(Mutex::new(None)),
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

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl LogSource for FileTailer {
    fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }

        self.stop_flag.store(false, Ordering::SeqCst);
        let (tx, rx) = mpsc::sync_channel(self.buffer_capacity);
        self.rx = Some(rx);

        let mut state = TailedFile::new(self.path.clone());
        let time_filtered = self.filters.read().map(|f| f.time.is_active()).unwrap_or(false);
        if time_filtered {
            state.seek_to_start();
        } else {
            state.seek_to_end();
        }

        let worker = TailWorker {
            state,
            filters: Arc::clone(&self.filters),
            observer: self.observer.clone(),
            buffer: Arc::clone(&self.buffer),
            buffer_capacity: self.buffer_capacity,
            unavailable: Arc::clone(&self.unavailable),
            format: Arc::clone(&self.format),
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
        if self.unavailable.load(Ordering::SeqCst) {
            vec![self.path.clone()]
        } else {
            Vec::new()
        }
    }

    fn detected_format(&self) -> Option<LogFormat> {
        self.format.lock().ok().and_then(|g| *g)
    }
}

impl Drop for FileTailer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct TailWorker {
    state: TailedFile,
    filters: Arc<RwLock<FilterSet>>,
    observer: Option<RecordObserver>,
    buffer: Arc<Mutex<VecDeque<LogRecord>>>,
    buffer_capacity: usize,
    unavailable: Arc<AtomicBool>,
    format: Arc<Mutex<Option<LogFormat>>>,
    stop_flag: Arc<AtomicBool>,
    poll_interval: Duration,
    tx: SyncSender<LogRecord>,
}

impl TailWorker {
    fn run(mut self) {
        while !self.stop_flag.load(Ordering::SeqCst) {
            let records = self.state.read_new_records();

            self.unavailable
                .store(self.state.is_unavailable(), Ordering::SeqCst);
            if let Ok(mut guard) = self.format.lock() {
                *guard = self.state.detected_format();
            }

            for record in records {
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

    /// Push into the bounded queue, waiting while it is full. Returns
    /// false when the tailer is stopping or the receiver is gone.
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
