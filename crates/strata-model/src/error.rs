use crate::arena::ElementKey;

/// Errors from the document tree model.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ModelError {
    /// A key does not address any element of the arena.
    #[error("no element stored under {0}")]
    DanglingKey(ElementKey),

    /// An element was built without a type name.
    #[error("element has an empty type name")]
    EmptyTypeName,
}

/// Result alias for model operations.
pub type ModelResult<T> = Result<T, ModelError>;
