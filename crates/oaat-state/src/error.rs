//! Error types for the item status model.

use thiserror::Error;

/// Result type alias for item model operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur when working with an item collection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("item not found: {0}")]
    NotFound(String),

    #[error("duplicate item name: {0}")]
    DuplicateItem(String),

    #[error("empty item name")]
    EmptyName,
}
