use std::fmt;

/// A variable refers back to itself, directly or through other variables.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct CycleError {
    /// Names in resolution order, ending with the repeated name.
    pub chain: Vec<String>,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "variable cycle: {}", self.chain.join(" -> "))
    }
}

/// Errors from variable storage and resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VariableError {
    #[error(transparent)]
    Cycle(#[from] CycleError),

    /// A variable name that can never be referenced by a token.
    #[error("invalid variable name: {0:?}")]
    InvalidName(String),
}

/// Result alias for variable operations.
pub type VariableResult<T> = Result<T, VariableError>;
