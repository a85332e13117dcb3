use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid configuration identity: {0}")]
    InvalidIdentity(String),

    #[error("unknown merge behavior: {0}")]
    UnknownBehavior(String),

    #[error("unknown attribute operation: {0}")]
    UnknownOperation(String),

    #[error("unknown on-error policy: {0}")]
    UnknownOnError(String),
}
