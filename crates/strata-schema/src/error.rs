/// Errors from schema registry operations.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The registry has been closed and no longer accepts changes.
    #[error("schema registry is closed")]
    Closed,

    /// Two entries were registered under the same pid.
    #[error("duplicate registry entry: {0}")]
    DuplicatePid(String),

    /// An alias is already claimed by another entry.
    #[error("alias {alias} of {pid} is already used by {existing}")]
    DuplicateAlias {
        pid: String,
        alias: String,
        existing: String,
    },

    /// A schema document could not be decoded.
    #[error("invalid schema document {location}: {reason}")]
    Parse { location: String, reason: String },

    /// I/O error while reading a schema document.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;
