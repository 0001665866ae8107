//! Color mapping from the core's semantic style tokens to terminal
//! styles.

use ratatui::style::{Color, Modifier, Style};

use pgtail_core::highlight::HighlightStyle;
use pgtail_core::model::LogLevel;

/// Terminal color palette.
pub struct Theme;

impl Theme {
    pub const FG: Color = Color::White;
    pub const FG_DIM: Color = Color::DarkGray;
    pub const STATUS_BG: Color = Color::Blue;
    pub const STATUS_FG: Color = Color::White;
    pub const PAUSED: Color = Color::Yellow;

    pub const SQL_KEYWORD: Color = Color::Cyan;
    pub const TIMESTAMP: Color = Color::DarkGray;
    pub const NUMBER: Color = Color::Magenta;
    pub const STRING: Color = Color::Green;
    pub const SQLSTATE: Color = Color::Yellow;
    pub const CUSTOM: Color = Color::Blue;
}

/// Style for a highlighter token.
pub fn highlight_style(style: &HighlightStyle) -> Style {
    match style {
        HighlightStyle::SqlKeyword => Style::default().fg(Theme::SQL_KEYWORD),
        HighlightStyle::Timestamp => Style::default().fg(Theme::TIMESTAMP),
        HighlightStyle::Number => Style::default().fg(Theme::NUMBER),
        HighlightStyle::StringLiteral => Style::default().fg(Theme::STRING),
        HighlightStyle::SqlState => Style::default().fg(Theme::SQLSTATE),
        HighlightStyle::DurationWarning => Style::default().fg(Color::Yellow),
        HighlightStyle::DurationSlow => {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        }
        HighlightStyle::DurationCritical => {
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
        }
        HighlightStyle::Custom(_) => Style::default().fg(Theme::CUSTOM),
    }
}

/// Base style for unstyled text on a line of the given level.
pub fn level_style(level: LogLevel) -> Style {
    match level {
        LogLevel::Panic | LogLevel::Fatal => {
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
        }
        LogLevel::Error => Style::default().fg(Color::Red),
        LogLevel::Warning => Style::default().fg(Color::Yellow),
        LogLevel::Notice => Style::default().fg(Color::Cyan),
        LogLevel::Log | LogLevel::Info => Style::default().fg(Theme::FG),
        _ => Style::default().fg(Theme::FG_DIM),
    }
}

/// Status bar style.
pub fn status_style() -> Style {
    Style::default()
        .fg(Theme::STATUS_FG)
        .bg(Theme::STATUS_BG)
        .add_modifier(Modifier::BOLD)
}
