use strata_merge::MergeError;
use strata_model::ModelError;
use strata_store::StoreError;
use strata_vars::{CycleError, VariableError};

/// Errors that fail the evaluation of one element.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// An attribute value could not be converted or violates its definition.
    #[error("invalid value for attribute {attribute}: {reason}")]
    Validation { attribute: String, reason: String },

    /// A `pid` attribute names neither a reference type nor a service.
    #[error("attribute {attribute} cannot resolve {target}: no reference type or service declared")]
    Reference { attribute: String, target: String },

    /// Variable substitution looped.
    #[error(transparent)]
    Cycle(CycleError),

    #[error(transparent)]
    Variable(VariableError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl EvalError {
    pub(crate) fn validation(attribute: impl Into<String>, reason: impl Into<String>) -> Self {
        EvalError::Validation {
            attribute: attribute.into(),
            reason: reason.into(),
        }
    }
}

impl From<VariableError> for EvalError {
    fn from(err: VariableError) -> Self {
        match err {
            VariableError::Cycle(cycle) => EvalError::Cycle(cycle),
            other => EvalError::Variable(other),
        }
    }
}

/// Result alias for evaluation.
pub type EvalResult<T> = Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_errors_keep_their_chain() {
        let err: EvalError = VariableError::Cycle(CycleError {
            chain: vec!["a".into(), "b".into(), "a".into()],
        })
        .into();
        match err {
            EvalError::Cycle(cycle) => assert_eq!(cycle.chain.len(), 3),
            other => panic!("expected Cycle, got {:?}", other),
        }
    }

    #[test]
    fn validation_display() {
        let err = EvalError::validation("port", "not a number");
        assert_eq!(err.to_string(), "invalid value for attribute port: not a number");
    }
}
