//! Monitoring cycles and their schedule.

pub mod cycle;
pub mod scheduler;

pub use cycle::{CycleError, CycleOptions, CycleOutcome, CycleReport, CycleRunner, CycleStage};
pub use scheduler::{shutdown_signal, CycleGuard, Scheduler, SchedulerStats};
