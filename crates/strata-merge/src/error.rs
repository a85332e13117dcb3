use strata_model::ModelError;

/// A document could not be decoded.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("malformed document {location}: {reason}")]
pub struct ParseError {
    pub location: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from loading and merging documents.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// A document includes itself, directly or transitively.
    #[error("include cycle: {location} is already included via {chain}")]
    IncludeCycle { location: String, chain: String },

    /// A document could not be decoded.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A required document does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// I/O failure while reading a document.
    #[error("I/O error reading {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    /// A stored element could not be resolved.
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl MergeError {
    /// Structural errors never abort a refresh on their own.
    pub fn is_structural(&self) -> bool {
        matches!(self, MergeError::IncludeCycle { .. })
    }
}

/// Result alias for merge operations.
pub type MergeResult<T> = Result<T, MergeError>;
