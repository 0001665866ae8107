//! Bounded history of rendered records with the FOLLOW/PAUSED state
//! machine that powers interactive scrolling and re-filtering.
//!
//! Single-writer (the runtime driver) / single-reader (the renderer query
//! API). Eviction is FIFO by age regardless of filter outcome.

use std::collections::VecDeque;

use crate::filter::FilterSet;
use crate::highlight::StyledRun;
use crate::model::{LogLevel, LogRecord};

/// Default buffer capacity.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// One rendered visual line.
pub type StyledLine = Vec<StyledRun>;

/// A line handed to the renderer: the style runs plus the level of the
/// record it came from (`None` for blank padding lines).
#[derive(Debug, Clone)]
pub struct VisibleLine {
    pub level: Option<LogLevel>,
    pub runs: StyledLine,
}

/// A record with its pre-rendered style runs and cached filter outcome.
#[derive(Debug, Clone)]
pub struct FormattedRecord {
    pub record: LogRecord,
    /// Rendered visual lines (always at least one).
    pub lines: Vec<StyledLine>,
    pub passes_filter: bool,
}

impl FormattedRecord {
    fn visual_lines(&self) -> usize {
        self.lines.len().max(1)
    }
}

/// Bounded FIFO of formatted records plus viewport state.
///
/// While PAUSED the viewport is pinned: appended records grow the scroll
/// offset so the same content stays on screen, and `new_since_pause`
/// counts what accumulated off-screen. FOLLOW keeps the offset at zero.
#[derive(Debug)]
pub struct HistoryBuffer {
    entries: VecDeque<FormattedRecord>,
    capacity: usize,
    scroll_offset: usize,
    follow_mode: bool,
    new_since_pause: u64,
    filters: FilterSet,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        HistoryBuffer {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            scroll_offset: 0,
            follow_mode: true,
            new_since_pause: 0,
            filters: FilterSet::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn follow_mode(&self) -> bool {
        self.follow_mode
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn new_since_pause(&self) -> u64 {
        self.new_since_pause
    }

    pub fn total_entries(&self) -> usize {
        self.entries.len()
    }

    /// Count of entries that pass the current filters.
    pub fn filtered_count(&self) -> usize {
        self.entries.iter().filter(|e| e.passes_filter).count()
    }

    /// Total visual lines of filter-passing entries.
    pub fn total_visual_lines(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.passes_filter)
            .map(FormattedRecord::visual_lines)
            .sum()
    }

    /// `(errors, warnings)` among filter-passing entries; FATAL and PANIC
    /// count as errors.
    pub fn filtered_error_warning_counts(&self) -> (u64, u64) {
        let mut errors = 0;
        let mut warnings = 0;
        for entry in self.entries.iter().filter(|e| e.passes_filter) {
            match entry.record.level {
                LogLevel::Error | LogLevel::Fatal | LogLevel::Panic => errors += 1,
                LogLevel::Warning => warnings += 1,
                _ => {}
            }
        }
        (errors, warnings)
    }

    /// Iterate all entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &FormattedRecord> {
        self.entries.iter()
    }

    /// Append a record with its rendered lines.
    ///
    /// Evicts FIFO at capacity; while PAUSED the scroll offset tracks the
    /// pinned viewport: eviction clamps it to the remaining content and a
    /// filter-passing append extends it by the new visual lines.
    pub fn append(&mut self, record: LogRecord, lines: Vec<StyledLine>) {
        let passes_filter = self.filters.should_show(&record);

        if self.entries.len() >= self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                if evicted.passes_filter && !self.follow_mode && self.scroll_offset > 0 {
                    let remaining = self.total_visual_lines();
                    self.scroll_offset = self.scroll_offset.min(remaining.saturating_sub(1));
                }
            }
        }

        let entry = FormattedRecord {
            record,
            lines,
            passes_filter,
        };
        let added_lines = entry.visual_lines();
        self.entries.push_back(entry);

        if !self.follow_mode && passes_filter {
            self.new_since_pause += 1;
            self.scroll_offset += added_lines;
        }
    }

    /// Scroll up (toward older content), entering PAUSED mode.
    pub fn scroll_up(&mut self, lines: usize) {
        if lines == 0 {
            return;
        }

        if self.follow_mode {
            self.follow_mode = false;
            self.new_since_pause = 0;
        }

        let max_offset = self.total_visual_lines().saturating_sub(1);
        self.scroll_offset = (self.scroll_offset + lines).min(max_offset);
    }

    /// Scroll down (toward newest). Passing the bottom resumes FOLLOW.
    pub fn scroll_down(&mut self, lines: usize) {
        if lines == 0 {
            return;
        }

        if lines >= self.scroll_offset {
            self.resume_follow();
        } else {
            self.scroll_offset -= lines;
        }
    }

    /// Jump to the oldest content, entering PAUSED mode.
    pub fn scroll_to_top(&mut self) {
        if self.follow_mode {
            self.follow_mode = false;
            self.new_since_pause = 0;
        }
        self.scroll_offset = self.total_visual_lines().saturating_sub(1);
    }

    /// Jump to the newest content, entering FOLLOW mode.
    pub fn resume_follow(&mut self) {
        self.follow_mode = true;
        self.scroll_offset = 0;
        self.new_since_pause = 0;
    }

    /// Enter PAUSED mode at the current position without scrolling.
    pub fn set_paused(&mut self) {
        self.follow_mode = false;
    }

    /// Re-evaluate `passes_filter` on every entry against the current
    /// filters. When paused with a nonzero offset, the offset is rescaled
    /// by the passing-record-count ratio and clamped to `[0, n-1]`.
    pub fn refilter(&mut self) {
        let old_count = self.filtered_count();

        for entry in &mut self.entries {
            entry.passes_filter = self.filters.should_show(&entry.record);
        }

        let new_count = self.filtered_count();

        if !self.follow_mode && self.scroll_offset > 0 && old_count != new_count {
            if old_count == 0 {
                self.scroll_offset = 0;
            } else {
                let scaled =
                    (self.scroll_offset as f64 / old_count as f64 * new_count as f64) as usize;
                self.scroll_offset = scaled.min(new_count.saturating_sub(1));
            }
        }
    }

    /// Re-render every entry's style runs in place, e.g. after a
    /// highlighter change. Scroll state is untouched.
    pub fn rerender_with<F>(&mut self, mut render: F)
    where
        F: FnMut(&LogRecord) -> Vec<StyledLine>,
    {
        for entry in &mut self.entries {
            entry.lines = render(&entry.record);
        }
    }

    /// Replace the filter state and refilter existing contents.
    pub fn update_filters(&mut self, filters: FilterSet) {
        self.filters = filters;
        self.refilter();
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    /// Empty the buffer and reset scroll state. The FOLLOW/PAUSED flag is
    /// kept as-is.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.scroll_offset = 0;
        self.new_since_pause = 0;
    }

    /// Visible lines for a viewport of `height` visual lines, top to
    /// bottom, bottom-aligned with blank lines when content is short.
    ///
    /// Walks backward through filter-passing entries, skipping
    /// `scroll_offset` visual lines, then collecting up to `height` lines
    /// (an entry taller than the whole viewport is included alone).
    pub fn visible_lines(&self, height: usize) -> Vec<VisibleLine> {
        if height == 0 {
            return Vec::new();
        }

        let mut to_skip = self.scroll_offset;
        let mut collected: VecDeque<&FormattedRecord> = VecDeque::new();
        let mut accumulated = 0usize;

        for entry in self.entries.iter().rev().filter(|e| e.passes_filter) {
            let line_count = entry.visual_lines();

            if to_skip > 0 {
                if line_count <= to_skip {
                    to_skip -= line_count;
                    continue;
                }
                to_skip = 0;
            }

            if accumulated + line_count <= height {
                collected.push_front(entry);
                accumulated += line_count;
            } else {
                if collected.is_empty() {
                    collected.push_front(entry);
                    accumulated += line_count;
                }
                break;
            }
        }

        let mut lines: Vec<VisibleLine> = Vec::new();
        for _ in accumulated..height {
            lines.push(VisibleLine {
                level: None,
                runs: vec![(None, String::new())],
            });
        }
        for entry in collected {
            for line in &entry.lines {
                lines.push(VisibleLine {
                    level: Some(entry.record.level),
                    runs: line.clone(),
                });
            }
            if entry.lines.is_empty() {
                lines.push(VisibleLine {
                    level: Some(entry.record.level),
                    runs: vec![(None, String::new())],
                });
            }
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::apply_filter_token;
    use crate::model::LogFormat;

    fn record(i: usize, level: LogLevel) -> LogRecord {
        LogRecord {
            level,
            ..LogRecord::fallback(&format!("record number {i}"), LogFormat::Text)
        }
    }

    fn plain_lines(text: &str) -> Vec<StyledLine> {
        vec![vec![(None, text.to_string())]]
    }

    fn append_plain(buffer: &mut HistoryBuffer, i: usize, level: LogLevel) {
        let rec = record(i, level);
        let lines = plain_lines(&rec.raw);
        buffer.append(rec, lines);
    }

    fn visible_texts(buffer: &HistoryBuffer, height: usize) -> Vec<String> {
        buffer
            .visible_lines(height)
            .iter()
            .map(|line| {
                line.runs
                    .iter()
                    .map(|(_, t)| t.as_str())
                    .collect::<String>()
            })
            .collect()
    }

    #[test]
    fn test_follow_mode_invariant_after_appends() {
        let mut buffer = HistoryBuffer::new(100);
        for i in 0..150 {
            append_plain(&mut buffer, i, LogLevel::Log);
            assert!(buffer.follow_mode());
            assert_eq!(buffer.scroll_offset(), 0);
            assert_eq!(buffer.new_since_pause(), 0);
        }
        assert_eq!(buffer.total_entries(), 100);
    }

    #[test]
    fn test_eviction_is_fifo_regardless_of_filter() {
        let mut buffer = HistoryBuffer::new(3);
        let mut filters = FilterSet::default();
        filters.levels = Some([LogLevel::Error].into_iter().collect());
        buffer.update_filters(filters);

        append_plain(&mut buffer, 0, LogLevel::Error);
        append_plain(&mut buffer, 1, LogLevel::Log);
        append_plain(&mut buffer, 2, LogLevel::Log);
        append_plain(&mut buffer, 3, LogLevel::Log);

        // The filter-passing error was oldest and is gone despite passing.
        assert_eq!(buffer.total_entries(), 3);
        assert_eq!(buffer.filtered_count(), 0);
    }

    #[test]
    fn test_paused_viewport_stable_across_appends_and_evictions() {
        let mut buffer = HistoryBuffer::new(100);
        for i in 0..100 {
            append_plain(&mut buffer, i, LogLevel::Log);
        }

        buffer.scroll_up(10);
        assert!(!buffer.follow_mode());
        assert_eq!(buffer.scroll_offset(), 10);

        let height = 5;
        let before = visible_texts(&buffer, height);

        // 50 appends evict the 50 oldest records.
        for i in 100..150 {
            append_plain(&mut buffer, i, LogLevel::Log);
        }

        let after = visible_texts(&buffer, height);
        assert_eq!(before, after);
        assert_eq!(before[0], "record number 85");
        assert_eq!(buffer.new_since_pause(), 50);
    }

    #[test]
    fn test_paused_offset_clamped_when_pinned_at_top() {
        let mut buffer = HistoryBuffer::new(10);
        for i in 0..10 {
            append_plain(&mut buffer, i, LogLevel::Log);
        }

        buffer.scroll_to_top();
        assert_eq!(buffer.scroll_offset(), 9);

        // Each eviction shrinks the content; the offset must stay valid.
        append_plain(&mut buffer, 10, LogLevel::Log);
        assert!(buffer.scroll_offset() <= buffer.total_visual_lines() - 1);
    }

    #[test]
    fn test_scroll_down_past_bottom_resumes_follow() {
        let mut buffer = HistoryBuffer::new(100);
        for i in 0..20 {
            append_plain(&mut buffer, i, LogLevel::Log);
        }

        buffer.scroll_up(5);
        assert!(!buffer.follow_mode());

        buffer.scroll_down(3);
        assert!(!buffer.follow_mode());
        assert_eq!(buffer.scroll_offset(), 2);

        buffer.scroll_down(10);
        assert!(buffer.follow_mode());
        assert_eq!(buffer.scroll_offset(), 0);
        assert_eq!(buffer.new_since_pause(), 0);
    }

    #[test]
    fn test_scroll_up_clamped_to_content() {
        let mut buffer = HistoryBuffer::new(100);
        for i in 0..5 {
            append_plain(&mut buffer, i, LogLevel::Log);
        }
        buffer.scroll_up(1000);
        assert_eq!(buffer.scroll_offset(), 4);
    }

    #[test]
    fn test_refilter_matches_fresh_rebuild() {
        let mut filters = FilterSet::default();
        apply_filter_token(&mut filters.regex, "/record number 1/").unwrap();

        // Buffer filtered after the fact...
        let mut refiltered = HistoryBuffer::new(100);
        for i in 0..30 {
            append_plain(&mut refiltered, i, LogLevel::Log);
        }
        refiltered.update_filters(filters.clone());

        // ...must agree with a buffer built with the filter from the start.
        let mut fresh = HistoryBuffer::new(100);
        fresh.update_filters(filters);
        for i in 0..30 {
            append_plain(&mut fresh, i, LogLevel::Log);
        }

        let refiltered_flags: Vec<bool> =
            refiltered.entries().map(|e| e.passes_filter).collect();
        let fresh_flags: Vec<bool> = fresh.entries().map(|e| e.passes_filter).collect();
        assert_eq!(refiltered_flags, fresh_flags);
        assert_eq!(refiltered.filtered_count(), fresh.filtered_count());
        // "record number 1" plus 10..19: 11 matches.
        assert_eq!(refiltered.filtered_count(), 11);
    }

    #[test]
    fn test_refilter_rescales_offset() {
        let mut buffer = HistoryBuffer::new(100);
        for i in 0..100 {
            append_plain(&mut buffer, i, LogLevel::Log);
        }
        buffer.scroll_up(50);
        assert_eq!(buffer.scroll_offset(), 50);

        // Halve the passing set: offsets rescale by n/m.
        let mut filters = FilterSet::default();
        apply_filter_token(&mut filters.regex, "/number \\d*[02468]$/").unwrap();
        buffer.update_filters(filters);

        assert_eq!(buffer.filtered_count(), 50);
        assert_eq!(buffer.scroll_offset(), 25);

        // Filtering down to nothing drops the offset to zero.
        let mut none = FilterSet::default();
        none.levels = Some([LogLevel::Panic].into_iter().collect());
        buffer.update_filters(none);
        assert_eq!(buffer.scroll_offset(), 0);
    }

    #[test]
    fn test_visible_lines_bottom_aligned() {
        let mut buffer = HistoryBuffer::new(100);
        append_plain(&mut buffer, 0, LogLevel::Log);
        append_plain(&mut buffer, 1, LogLevel::Log);

        let lines = visible_texts(&buffer, 5);
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "record number 0");
        assert_eq!(lines[4], "record number 1");
    }

    #[test]
    fn test_visible_lines_respects_filters() {
        let mut buffer = HistoryBuffer::new(100);
        let mut filters = FilterSet::default();
        filters.levels = Some([LogLevel::Error].into_iter().collect());
        buffer.update_filters(filters);

        append_plain(&mut buffer, 0, LogLevel::Error);
        append_plain(&mut buffer, 1, LogLevel::Log);
        append_plain(&mut buffer, 2, LogLevel::Error);

        let lines = visible_texts(&buffer, 2);
        assert_eq!(lines, vec!["record number 0", "record number 2"]);
    }

    #[test]
    fn test_clear_keeps_follow_flag() {
        let mut buffer = HistoryBuffer::new(100);
        for i in 0..10 {
            append_plain(&mut buffer, i, LogLevel::Log);
        }
        buffer.scroll_up(3);
        buffer.clear();

        assert_eq!(buffer.total_entries(), 0);
        assert_eq!(buffer.scroll_offset(), 0);
        assert_eq!(buffer.new_since_pause(), 0);
        assert!(!buffer.follow_mode());

        buffer.resume_follow();
        buffer.clear();
        assert!(buffer.follow_mode());
    }

    #[test]
    fn test_error_warning_counts() {
        let mut buffer = HistoryBuffer::new(100);
        append_plain(&mut buffer, 0, LogLevel::Error);
        append_plain(&mut buffer, 1, LogLevel::Fatal);
        append_plain(&mut buffer, 2, LogLevel::Warning);
        append_plain(&mut buffer, 3, LogLevel::Log);

        assert_eq!(buffer.filtered_error_warning_counts(), (2, 1));
    }

    #[test]
    fn test_pause_without_scroll() {
        let mut buffer = HistoryBuffer::new(100);
        append_plain(&mut buffer, 0, LogLevel::Log);
        buffer.set_paused();
        assert!(!buffer.follow_mode());
        assert_eq!(buffer.scroll_offset(), 0);

        append_plain(&mut buffer, 1, LogLevel::Log);
        assert_eq!(buffer.new_since_pause(), 1);
        // The viewport stays pinned on the pre-pause content.
        assert_eq!(buffer.scroll_offset(), 1);
    }
}
