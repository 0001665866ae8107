//! Terminal user interface for the tail session.
//!
//! A thin ratatui front-end over the core runtime: the log viewport reads
//! the shared history buffer, key input turns into runtime commands, and
//! the status bar shows filter state, counts and one-line diagnostics.

mod app;
mod input;
mod render;
mod style;

pub use app::App;
