//! Logging for pulse: process-wide tracing setup and per-run audit logs.

mod run_log;
mod tracing;

pub use self::tracing::{init, init_with_level};
pub use run_log::RunLog;
