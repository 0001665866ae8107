//! Main TUI application loop.
//!
//! Input is polled inline: each iteration draws the viewport, then blocks
//! on terminal input for at most one refresh tick. The tick length tracks
//! the buffer's FOLLOW/PAUSED state, so a live tail redraws quickly while
//! a pinned viewport only refreshes its status counters.

use std::io;
use std::time::Duration;

use crossterm::event::{self, Event as CrosstermEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use pgtail_core::runtime::{AnalyticsSnapshot, Command, RuntimeHandle};

use super::input::{handle_key, KeyAction};
use super::render::render;

/// Refresh cadence while following the live tail.
const FOLLOW_TICK: Duration = Duration::from_millis(100);

/// Refresh cadence while paused: the viewport is pinned, so only the
/// status counters need to move. Key presses still interrupt the wait
/// immediately.
const PAUSED_TICK: Duration = Duration::from_millis(500);

/// Input mode of the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// Typing a `:` command.
    Command,
}

/// UI-side state (the log content itself lives in the runtime's buffer).
pub struct AppState {
    pub input_mode: InputMode,
    pub command_input: String,
    pub status_message: Option<String>,
    pub analytics: Option<AnalyticsSnapshot>,
    /// Height of the log viewport, for PageUp/PageDown.
    pub page_height: usize,
}

impl AppState {
    fn new() -> Self {
        AppState {
            input_mode: InputMode::Normal,
            command_input: String::new(),
            status_message: None,
            analytics: None,
            page_height: 25,
        }
    }
}

/// Main TUI application.
pub struct App {
    handle: RuntimeHandle,
    state: AppState,
    should_quit: bool,
}

impl App {
    /// Creates a new App over a running session.
    pub fn new(handle: RuntimeHandle, start_following: bool) -> Self {
        if !start_following {
            handle.send(Command::Pause);
        }
        Self {
            handle,
            state: AppState::new(),
            should_quit: false,
        }
    }

    /// Runs the TUI application until the user quits.
    pub fn run(mut self) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        loop {
            // Pick up driver-side state before drawing.
            if let Some(status) = self.handle.poll_status() {
                self.state.status_message = Some(status.message);
            }
            self.state.analytics = self.handle.analytics();

            let mut following = true;
            if let Ok(buffer) = self.handle.buffer.lock() {
                following = buffer.follow_mode();
                terminal.draw(|frame| render(frame, &mut self.state, &buffer))?;
            }

            let tick = if following { FOLLOW_TICK } else { PAUSED_TICK };
            if event::poll(tick)? {
                match event::read()? {
                    CrosstermEvent::Key(key) if key.kind != KeyEventKind::Release => {
                        match handle_key(&mut self.state, key) {
                            KeyAction::Quit => self.should_quit = true,
                            KeyAction::Run(command) => {
                                // A fresh command replaces any stale diagnostic.
                                self.state.status_message = None;
                                self.handle.send(command);
                            }
                            KeyAction::Message(message) => {
                                self.state.status_message = Some(message);
                            }
                            KeyAction::None => {}
                        }
                    }
                    // Resize is handled implicitly: the next draw reads
                    // the new frame area and page_height follows it.
                    _ => {}
                }
            }

            if self.should_quit {
                break;
            }
        }

        self.handle.send(Command::Stop);

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        Ok(())
    }
}
