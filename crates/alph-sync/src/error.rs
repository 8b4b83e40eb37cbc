//! Error types for sync operations

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a chain data provider
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Backend could not be reached
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// Backend answered with an error
    #[error("Backend rejected request: {0}")]
    BackendRejected(String),
}

impl SyncError {
    /// Whether the failure came from connectivity rather than the backend
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::NetworkUnavailable(_))
    }
}

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Sync did not complete; cached state is unchanged
    #[error("Sync failed: {0}")]
    SyncFailed(#[from] SyncError),

    /// Address derivation failed during discovery
    #[error("Derivation error: {0}")]
    Derivation(#[from] alph_core::DerivationError),

    /// Caller withdrew the work before it finished
    #[error("Cancelled")]
    Cancelled,
}

impl Error {
    /// Whether retrying later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::SyncFailed(_) => true,
            Error::Derivation(_) | Error::Cancelled => false,
        }
    }
}
