/// Errors from persistent store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No object is stored under this persistent id.
    #[error("configuration not found: {0}")]
    NotFound(String),

    /// The backend refuses writes.
    #[error("store is read-only")]
    ReadOnly,

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from delivering change notifications.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The receiving side has gone away.
    #[error("notification channel closed")]
    ChannelClosed,

    /// The listener refused the change.
    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Result alias for notification delivery.
pub type NotifyResult<T> = Result<T, NotifyError>;
