//! Error types for the delta engine.

use strata_merge::MergeError;
use strata_model::ModelError;
use strata_vars::{CycleError, VariableError};

/// Errors that can occur while computing a delta.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// A variable of either snapshot refers back to itself.
    #[error(transparent)]
    Cycle(CycleError),

    #[error("variable error: {0}")]
    Variable(VariableError),

    /// Merging the candidates of one snapshot failed.
    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    /// A nested element could not be resolved in its snapshot.
    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

impl From<VariableError> for DiffError {
    fn from(e: VariableError) -> Self {
        match e {
            VariableError::Cycle(cycle) => DiffError::Cycle(cycle),
            other => DiffError::Variable(other),
        }
    }
}

/// Convenience alias for delta results.
pub type DiffResult<T> = Result<T, DiffError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_cycles_surface_as_cycle() {
        let err: DiffError = VariableError::Cycle(CycleError {
            chain: vec!["a".into(), "b".into(), "a".into()],
        })
        .into();
        match err {
            DiffError::Cycle(cycle) => assert_eq!(cycle.chain.len(), 3),
            other => panic!("expected Cycle, got {:?}", other),
        }
    }
}
