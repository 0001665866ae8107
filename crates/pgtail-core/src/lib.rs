//! pgtail-core — shared library for the pgtail ecosystem.
//!
//! Provides:
//! - `model` — the uniform log record consumed by every pipeline stage
//! - `parse` — format detection and TEXT/CSV/JSON log parsing
//! - `filter` — level, regex, time-window and field filtering
//! - `source` — file tailing, multi-file fan-in, stdin ingestion
//! - `stats` — session-scoped error/connection/duration aggregators
//! - `notify` — notification rules, rate limiting, quiet hours
//! - `highlight` — span-producing highlighter chain for the renderer
//! - `buffer` — bounded history with FOLLOW/PAUSED scroll management
//! - `runtime` — the driver wiring sources, filters, buffer and stats
//! - `export` — TEXT/JSONL/CSV export and pipe-to-command
//! - `config` — flat key-value session configuration

pub mod buffer;
pub mod config;
pub mod export;
pub mod filter;
pub mod highlight;
pub mod model;
pub mod notify;
pub mod parse;
pub mod runtime;
pub mod source;
pub mod stats;
