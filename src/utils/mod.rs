//! Shared utility functions.
//!
//! - `retry`: bounded retry policy used by fetches and deliveries
//! - `task_group`: ordered fan-out over independent futures
//! - `format`: human-readable formatting for log and console output

mod format;
pub mod retry;
pub mod task_group;

pub use format::{format_duration, format_excerpt};
pub use retry::{AttemptTimeout, Backoff, Exhausted, RetryPolicy};
pub use task_group::TaskGroup;
