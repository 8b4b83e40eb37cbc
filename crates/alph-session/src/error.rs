//! Error types for wallet sessions

use alph_core::DerivationError;

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Authentication failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// User dismissed the prompt
    #[error("Authentication cancelled")]
    Cancelled,

    /// Biometrics revoked or not enrolled
    #[error("Biometric authentication unavailable")]
    Unavailable,

    /// Stored credentials cannot be decrypted; the wallet must be re-imported
    #[error("Stored credentials are corrupt: {0}")]
    CredentialCorrupt(String),

    /// PIN did not match
    #[error("Invalid credential")]
    InvalidCredential,

    /// Secure storage failed
    #[error("Secure storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// Whether prompting again may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Cancelled | AuthError::InvalidCredential)
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Cancelled => "Authentication was cancelled.".to_string(),
            AuthError::Unavailable => {
                "Biometric unlock is unavailable. Please use your PIN.".to_string()
            }
            AuthError::CredentialCorrupt(_) => {
                "This wallet can no longer be unlocked. Please import it again with your secret recovery phrase."
                    .to_string()
            }
            AuthError::InvalidCredential => "Incorrect PIN. Please try again.".to_string(),
            AuthError::Storage(_) => {
                "Could not access secure storage. Please try again.".to_string()
            }
        }
    }

    /// Classify a credential store failure
    pub fn from_storage(err: alph_storage::Error) -> Self {
        match err {
            alph_storage::Error::InvalidCredential => AuthError::InvalidCredential,
            e if e.is_corruption() => AuthError::CredentialCorrupt(e.to_string()),
            alph_storage::Error::NotFound(what) => {
                AuthError::CredentialCorrupt(format!("missing {}", what))
            }
            alph_storage::Error::Core(e) => AuthError::CredentialCorrupt(e.to_string()),
            e => AuthError::Storage(e.to_string()),
        }
    }
}

/// Session errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operation needs an unlocked wallet
    #[error("Wallet is locked")]
    NotUnlocked,

    /// No wallet loaded in the session
    #[error("No active wallet")]
    NoActiveWallet,

    /// Authentication failed
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Storage failed
    #[error("Storage error: {0}")]
    Storage(#[from] alph_storage::Error),

    /// Wallet model error
    #[error("Wallet error: {0}")]
    Core(#[from] alph_core::Error),

    /// Address derivation failed
    #[error("Derivation error: {0}")]
    Derivation(#[from] DerivationError),

    /// Sync failed
    #[error("Sync error: {0}")]
    Sync(#[from] alph_sync::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the same call may succeed when repeated
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Auth(e) => e.is_retryable(),
            Error::Storage(e) => e.is_retryable(),
            Error::Sync(e) => e.is_retryable(),
            _ => false,
        }
    }
}
