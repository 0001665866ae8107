//! Session-scoped analytics aggregators.
//!
//! All three aggregators observe the full record stream (not just
//! filter-passing records) through the source observer and are mutated
//! only by the runtime driver.

mod connections;
mod durations;
mod errors;

pub use connections::{
    parse_connection_message, parse_session_duration, ConnectionEvent, ConnectionEventType,
    ConnectionStats,
};
pub use durations::{
    extract_duration, DurationStats, DurationSummary, SlowQueryConfig, SlowQueryLevel,
};
pub use errors::{sparkline, sqlstate_category, sqlstate_name, ErrorEvent, ErrorStats};
