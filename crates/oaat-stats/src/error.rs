//! Statistics error types.

use thiserror::Error;

/// Errors from decoding stored runtime statistics.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("malformed runtime field {field}: {value:?}")]
    Malformed { field: &'static str, value: String },

    #[error("inconsistent runtime statistics: {0}")]
    Inconsistent(String),
}
