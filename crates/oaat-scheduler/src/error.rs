//! Scheduler error types.

use thiserror::Error;

/// Errors that can occur during item selection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("no items configured")]
    NoItemsConfigured,
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
