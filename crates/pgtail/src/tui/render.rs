//! Main rendering logic for the tail session.

use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use pgtail_core::buffer::HistoryBuffer;

use super::app::{AppState, InputMode};
use super::style::{highlight_style, level_style, status_style, Theme};

/// Main render function.
pub fn render(frame: &mut Frame, state: &mut AppState, buffer: &HistoryBuffer) {
    let area = frame.area();

    let chunks = Layout::vertical([
        Constraint::Min(1),    // Log viewport
        Constraint::Length(1), // Status bar
    ])
    .split(area);

    state.page_height = chunks[0].height as usize;

    render_log(frame, chunks[0], buffer);
    render_status(frame, chunks[1], state, buffer);
}

fn render_log(frame: &mut Frame, area: Rect, buffer: &HistoryBuffer) {
    let visible = buffer.visible_lines(area.height as usize);

    let lines: Vec<Line<'_>> = visible
        .iter()
        .map(|line| {
            let base = line.level.map(level_style).unwrap_or_default();
            let spans: Vec<Span<'_>> = line
                .runs
                .iter()
                .map(|(style, text)| match style {
                    Some(style) => Span::styled(text.clone(), highlight_style(style)),
                    None => Span::styled(text.clone(), base),
                })
                .collect();
            Line::from(spans)
        })
        .collect();

    frame.render_widget(Paragraph::new(lines), area);
}

fn render_status(frame: &mut Frame, area: Rect, state: &AppState, buffer: &HistoryBuffer) {
    let text = match state.input_mode {
        InputMode::Command => format!(":{}", state.command_input),
        InputMode::Normal => {
            let mode = if buffer.follow_mode() {
                "FOLLOW".to_string()
            } else {
                format!("PAUSED (+{})", buffer.new_since_pause())
            };

            let (errors, warnings) = buffer.filtered_error_warning_counts();
            let mut parts = vec![
                mode,
                format!("{}/{} shown", buffer.filtered_count(), buffer.total_entries()),
                format!("{errors} err {warnings} warn"),
            ];

            if let Some(analytics) = &state.analytics {
                parts.push(format!("conns {}", analytics.active_connections));
                if analytics.durations.count > 0 {
                    parts.push(format!("p95 {:.0}ms", analytics.durations.p95));
                }
            }

            if let Some(message) = &state.status_message {
                parts.push(message.clone());
            }

            parts.join("  |  ")
        }
    };

    let style = if buffer.follow_mode() || state.input_mode == InputMode::Command {
        status_style()
    } else {
        status_style().fg(Theme::PAUSED)
    };

    frame.render_widget(Paragraph::new(text).style(style), area);
}
