//! Scheduled check runs for the configured targets.
//!
//! - `checker`: metric queries implementing [`pulse::Check`]
//! - `executor`: one full check run for a target
//! - `scheduler`: periodic runs feeding reports into a channel
pub mod checker;
pub mod executor;
pub mod scheduler;
pub mod types;

pub use checker::default_checks;
pub use executor::MonitoringExecutor;
pub use scheduler::MonitoringScheduler;
pub use types::TargetReport;
