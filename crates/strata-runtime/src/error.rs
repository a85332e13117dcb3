//! Error types for the refresh pipeline.

use std::path::PathBuf;

use strata_diff::DiffError;
use strata_eval::EvalError;
use strata_merge::MergeError;
use strata_store::StoreError;
use strata_types::ConfigId;
use strata_vars::VariableError;

/// Errors that abort a refresh. The previously active snapshot stays in
/// place whenever one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The root document, or any document under on-error FAIL, could not be loaded.
    #[error("load failed: {0}")]
    Merge(#[from] MergeError),

    #[error("delta failed: {0}")]
    Diff(#[from] DiffError),

    /// An element failed evaluation under on-error FAIL.
    #[error("evaluation of {identity} failed: {source}")]
    Eval {
        identity: ConfigId,
        #[source]
        source: EvalError,
    },

    /// An element evaluated invalid under on-error FAIL, for instance a
    /// required attribute with no value.
    #[error("{identity} is invalid: {}", .reasons.join("; "))]
    Invalid { identity: ConfigId, reasons: Vec<String> },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("variable error: {0}")]
    Variable(#[from] VariableError),

    /// The runtime configuration file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid runtime configuration: {0}")]
    Config(#[from] toml::de::Error),
}

/// Convenience alias for runtime results.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
