//! Per-file tail state: seek position, rotation detection and incremental
//! line reading with lossy UTF-8 decoding.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use tracing::debug;

use super::source_label;
use crate::model::{LogFormat, LogRecord};
use crate::parse::{detect_format, parse_line};

/// Tail state for one file.
///
/// Rotation is detected when the inode changes, the file shrinks below the
/// recorded position, or the mtime changes while the size stays put and
/// the position has already reached it (copy-truncate with same-size
/// replacement). On rotation the position resets to 0 and the cached
/// format is forgotten.
#[derive(Debug)]
pub struct TailedFile {
    path: PathBuf,
    position: u64,
    inode: Option<u64>,
    mtime: Option<SystemTime>,
    last_size: u64,
    format: Option<LogFormat>,
    unavailable_since: Option<Instant>,
}

impl TailedFile {
    /// New state positioned at offset 0.
    pub fn new(path: PathBuf) -> Self {
        TailedFile {
            path,
            position: 0,
            inode: None,
            mtime: None,
            last_size: 0,
            format: None,
            unavailable_since: None,
        }
    }

    /// Record current file identity and seek to end-of-file. Missing files
    /// leave the position at 0 (they will be read from the start when they
    /// appear).
    pub fn seek_to_end(&mut self) {
        if let Ok(meta) = fs::metadata(&self.path) {
            self.position = meta.len();
            self.inode = inode_of(&meta);
            self.mtime = meta.modified().ok();
            self.last_size = meta.len();
        }
    }

    /// Record current file identity but keep the position at the start.
    pub fn seek_to_start(&mut self) {
        if let Ok(meta) = fs::metadata(&self.path) {
            self.position = 0;
            self.inode = inode_of(&meta);
            self.mtime = meta.modified().ok();
            self.last_size = meta.len();
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn detected_format(&self) -> Option<LogFormat> {
        self.format
    }

    pub fn is_unavailable(&self) -> bool {
        self.unavailable_since.is_some()
    }

    /// Check for rotation against fresh metadata. Resets position and
    /// cached format when the heuristic fires.
    fn check_rotation(&mut self, meta: &fs::Metadata) -> bool {
        let current_inode = inode_of(meta);
        let current_mtime = meta.modified().ok();
        let size = meta.len();

        let inode_changed = self.inode.is_some() && current_inode != self.inode;
        let truncated = size < self.position;
        let mtime_rotation = self.mtime.is_some()
            && current_mtime != self.mtime
            && size == self.last_size
            && self.position >= size
            && size > 0;

        let rotated = inode_changed || truncated || mtime_rotation;
        if rotated {
            debug!(path = %self.path.display(), "log rotation detected, restarting from offset 0");
            self.position = 0;
            self.format = None;
        }

        self.inode = current_inode;
        self.mtime = current_mtime;
        self.last_size = size;

        rotated
    }

    /// Read lines appended since the last poll and parse them.
    ///
    /// Returns all parsed records, unfiltered; the caller applies the
    /// observer and filter. Never fails: a missing or unreadable file
    /// flips the unavailable flag and yields nothing, invalid UTF-8 is
    /// replaced, unparseable lines degrade to fallback records.
    pub fn read_new_records(&mut self) -> Vec<LogRecord> {
        let meta = match fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(_) => {
                if self.unavailable_since.is_none() {
                    debug!(path = %self.path.display(), "source unavailable");
                    self.unavailable_since = Some(Instant::now());
                }
                return Vec::new();
            }
        };

        if self.unavailable_since.take().is_some() {
            debug!(path = %self.path.display(), "source recovered");
        }

        self.check_rotation(&meta);

        if meta.len() <= self.position {
            return Vec::new();
        }

        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => {
                if self.unavailable_since.is_none() {
                    self.unavailable_since = Some(Instant::now());
                }
                return Vec::new();
            }
        };

        let mut reader = BufReader::new(file);
        if reader.seek(SeekFrom::Start(self.position)).is_err() {
            return Vec::new();
        }

        let label = source_label(&self.path);
        let mut records = Vec::new();
        let mut buf: Vec<u8> = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                continue;
            }

            // First non-empty line after a reset decides the format for
            // the rest of the session.
            let format = match self.format {
                Some(f) => f,
                None => {
                    let detected = detect_format(line);
                    debug!(path = %self.path.display(), format = %detected, "format detected");
                    self.format = Some(detected);
                    detected
                }
            };

            let mut record = parse_line(line, format);
            record.source_name = Some(label.clone());
            records.push(record);
        }

        if let Ok(pos) = reader.stream_position() {
            self.position = pos;
        }

        records
    }
}

/// Extract the inode from file metadata (Unix).
#[cfg(unix)]
fn inode_of(meta: &fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ino())
}

/// Fallback for non-Unix: identity unknown, size/mtime heuristics carry
/// rotation detection.
#[cfg(not(unix))]
fn inode_of(_meta: &fs::Metadata) -> Option<u64> {
    None
}
