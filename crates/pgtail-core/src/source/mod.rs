//! Record sources: single-file tailer, multi-file fan-in and stdin.
//!
//! Every source runs its polling I/O on a dedicated thread and hands
//! filter-passing records to the runtime through a bounded queue. An
//! optional observer sees ALL parsed records before filtering so stats and
//! notifications can watch the full stream.

mod file_state;
mod glob;
mod multi;
mod stdin;
mod tailer;

pub use file_state::TailedFile;
pub use glob::{is_glob_pattern, GlobPattern};
pub use multi::MultiTailer;
pub use stdin::StdinSource;
pub use tailer::FileTailer;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::filter::FilterSet;
use crate::model::{LogFormat, LogRecord};

/// Default capacity of a source's output queue and in-memory history.
pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;

/// Default polling interval for file sources.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default timeout for `next_record`.
pub const DEFAULT_NEXT_TIMEOUT: Duration = Duration::from_millis(10);

/// Observer invoked for every parsed record, before filtering.
pub type RecordObserver = Arc<dyn Fn(&LogRecord) + Send + Sync>;

/// Common contract of all record sources.
pub trait LogSource: Send {
    /// Begin producing records. Idempotent.
    fn start(&mut self);

    /// Signal the worker to exit and join it. Idempotent.
    fn stop(&mut self);

    /// Next filter-passing record, waiting up to `timeout`.
    fn next_record(&mut self, timeout: Duration) -> Option<LogRecord>;

    /// Copy of the bounded in-memory history of passing records.
    fn buffer_snapshot(&self) -> Vec<LogRecord>;

    /// Replace the filter state. Applies from the next poll onward.
    fn set_filters(&self, filters: FilterSet);

    /// Install the observer for all parsed records. Must be called before
    /// `start`.
    fn set_observer(&mut self, observer: RecordObserver);

    /// Paths currently unavailable (stat failing), if any.
    fn unavailable_paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    /// True once the source will never produce another record (stdin EOF).
    fn is_complete(&self) -> bool {
        false
    }

    /// Format detected for the (primary) stream, once known.
    fn detected_format(&self) -> Option<LogFormat> {
        None
    }
}

/// Basename used as a record's `source_name`.
pub(crate) fn source_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
