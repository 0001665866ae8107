//! Stdin ingestion for piped input (`zcat archived.log.gz | pgtail tail
//! --stdin`).
//!
//! Reads line by line on a background thread until EOF. The session keeps
//! running after EOF so already-ingested content stays browsable.

use std::collections::VecDeque;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::{mpsc, Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::filter::FilterSet;
use crate::model::{LogFormat, LogRecord};
use crate::parse::{detect_format, parse_line};

use super::{LogSource, RecordObserver, DEFAULT_BUFFER_CAPACITY};

/// Reads records from standard input (or any injected reader).
pub struct StdinSource {
    reader: Option<Box<dyn BufRead + Send>>,
    filters: Arc<RwLock<FilterSet>>,
    observer: Option<RecordObserver>,
    buffer: Arc<Mutex<VecDeque<LogRecord>>>,
    buffer_capacity: usize,
    format: Arc<Mutex<Option<LogFormat>>>,
    eof: Arc<AtomicBool>,
    lines_read: Arc<AtomicU64>,
    stop_flag: Arc<AtomicBool>,
    rx: Option<Receiver<LogRecord>>,
    handle: Option<JoinHandle<()>>,
}

impl StdinSource {
    /// Source over the process's standard input.
    pub fn new(filters: FilterSet) -> Self {
        Self::with_reader(Box::new(std::io::BufReader::new(std::io::stdin())), filters)
    }

    /// Source over an arbitrary reader (used by tests).
    pub fn with_reader(reader: Box<dyn BufRead + Send>, filters: FilterSet) -> Self {
        StdinSource {
            reader: Some(reader),
            filters: Arc::new(RwLock::new(filters)),
            observer: None,
            buffer: Arc::new(Mutex::new(VecDeque::new())),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            format: Arc::new(Mutex::new(None)),
            eof: Arc::new(AtomicBool::new(false)),
            lines_read: Arc::new(AtomicU64::new(0)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            rx: None,
            handle: None,
        }
    }

    /// Number of non-empty lines consumed so far.
    pub fn lines_read(&self) -> u64 {
        self.lines_read.load(Ordering::SeqCst)
    }
}

impl LogSource for StdinSource {
    fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        let Some(reader) = self.reader.take() else {
            return;
        };

        self.stop_flag.store(false, Ordering::SeqCst);
        let (tx, rx) = mpsc::sync_channel(self.buffer_capacity);
        self.rx = Some(rx);

        let worker = StdinWorker {
            reader,
            filters: Arc::clone(&self.filters),
            observer: self.observer.clone(),
            buffer: Arc::clone(&self.buffer),
            buffer_capacity: self.buffer_capacity,
            format: Arc::clone(&self.format),
            eof: Arc::clone(&self.eof),
            lines_read: Arc::clone(&self.lines_read),
            stop_flag: Arc::clone(&self.stop_flag),
            tx,
        };

        self.handle = Some(std::thread::spawn(move || worker.run()));
    }

    fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        // The worker may be blocked on a read; EOF or the next line will
        // release it. Join only when it already finished.
        if self.eof.load(Ordering::SeqCst) {
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        } else {
            self.handle.take();
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

    fn is_complete(&self) -> bool {
        self.eof.load(Ordering::SeqCst)
    }

    fn detected_format(&self) -> Option<LogFormat> {
        self.format.lock().ok().and_then(|g| *g)
    }
}

struct StdinWorker {
    reader: Box<dyn BufRead + Send>,
    filters: Arc<RwLock<FilterSet>>,
    observer: Option<RecordObserver>,
    buffer: Arc<Mutex<VecDeque<LogRecord>>>,
    buffer_capacity: usize,
    format: Arc<Mutex<Option<LogFormat>>>,
    eof: Arc<AtomicBool>,
    lines_read: Arc<AtomicU64>,
    stop_flag: Arc<AtomicBool>,
    tx: SyncSender<LogRecord>,
}

impl StdinWorker {
    fn run(mut self) {
        let mut buf: Vec<u8> = Vec::new();

        loop {
            if self.stop_flag.load(Ordering::SeqCst) {
                break;
            }

            buf.clear();
            match self.reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                continue;
            }
            self.lines_read.fetch_add(1, Ordering::SeqCst);

            let format = {
                let mut guard = match self.format.lock() {
                    Ok(g) => g,
                    Err(_) => break,
                };
                *guard.get_or_insert_with(|| detect_format(line))
            };

            let mut record = parse_line(line, format);
            record.source_name = Some("stdin".to_string());

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
                break;
            }
        }

        self.eof.store(true, Ordering::SeqCst);
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
    use crate::model::LogLevel;
    use std::io::Cursor;

    fn from_input(input: &str, filters: FilterSet) -> StdinSource {
        StdinSource::with_reader(Box::new(Cursor::new(input.as_bytes().to_vec())), filters)
    }

    fn drain(source: &mut StdinSource) -> Vec<LogRecord> {
        let mut out = Vec::new();
        while let Some(rec) = source.next_record(Duration::from_millis(200)) {
            out.push(rec);
        }
        out
    }

    #[test]
    fn test_reads_until_eof() {
        let input = "2024-01-15 10:00:00 UTC [1] LOG:  one\n\
                     2024-01-15 10:00:01 UTC [1] ERROR:  two\n";
        let mut source = from_input(input, FilterSet::default());
        source.start();

        let records = drain(&mut source);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source_name.as_deref(), Some("stdin"));
        assert_eq!(records[1].level, LogLevel::Error);
        assert!(source.is_complete());
        assert_eq!(source.lines_read(), 2);
    }

    #[test]
    fn test_detects_json_from_first_line() {
        let input = "{\"error_severity\":\"ERROR\",\"message\":\"boom\",\"state_code\":\"42P01\"}\n";
        let mut source = from_input(input, FilterSet::default());
        source.start();

        let records = drain(&mut source);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sql_state.as_deref(), Some("42P01"));
        assert_eq!(source.detected_format(), Some(LogFormat::Json));
    }

    #[test]
    fn test_filters_apply() {
        let input = "2024-01-15 10:00:00 UTC [1] LOG:  hidden\n\
                     2024-01-15 10:00:01 UTC [1] ERROR:  shown\n";
        let mut filters = FilterSet::default();
        filters.levels = Some([LogLevel::Error].into_iter().collect());

        let mut source = from_input(input, filters);
        source.start();

        let records = drain(&mut source);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "shown");
        // The buffer only holds passing records as well.
        assert_eq!(source.buffer_snapshot().len(), 1);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let input = "\n\n2024-01-15 10:00:00 UTC [1] LOG:  only\n\n";
        let mut source = from_input(input, FilterSet::default());
        source.start();

        let records = drain(&mut source);
        assert_eq!(records.len(), 1);
        assert_eq!(source.lines_read(), 1);
    }
}
