//! Error types

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Write did not complete; previous contents are unchanged
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Encryption error (blob unreadable or tampered)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Credential did not match the stored verifier
    #[error("Invalid credential")]
    InvalidCredential,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Security error
    #[error("Security error: {0}")]
    Security(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Wallet model error
    #[error("Wallet error: {0}")]
    Core(#[from] alph_core::Error),
}

impl Error {
    /// Whether the same call may succeed when repeated
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::WriteFailed(_) | Error::Database(_))
    }

    /// Whether the stored data can no longer be read
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Encryption(_) | Error::Serialization(_))
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
