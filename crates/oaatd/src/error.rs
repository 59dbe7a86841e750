//! Error types for the operator daemon.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("kubernetes request failed: {0}")]
    Kube(#[from] kube::Error),

    #[error("group {0} has no namespace")]
    MissingNamespace(String),

    #[error("group {0} has no uid")]
    MissingUid(String),

    #[error("pod {0} carries no parent group label")]
    NoParent(String),
}

pub type OperatorResult<T> = Result<T, OperatorError>;
