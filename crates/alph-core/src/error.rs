//! Error types for Alephium wallet core
//!
//! Categorised error taxonomy for key handling, address derivation, wallet
//! address sets, contacts and desktop import payloads.

use std::fmt;

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Wallet core errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid mnemonic
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// Invalid seed
    #[error("Invalid seed: {0}")]
    InvalidSeed(String),

    /// Address derivation failed
    #[error("Derivation error: {0}")]
    Derivation(#[from] DerivationError),

    /// Invalid address format
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Address not part of the wallet
    #[error("Address not found: {0}")]
    AddressNotFound(String),

    /// Address hash or index already present in the wallet
    #[error("Duplicate address: {0}")]
    DuplicateAddress(String),

    /// Attempt to clear the main flag without promoting another address
    #[error("Cannot unset main address: {0}")]
    CannotUnsetMain(String),

    /// Contact id already in use
    #[error("Duplicate contact: {0}")]
    DuplicateContact(String),

    /// Contact not found
    #[error("Contact not found: {0}")]
    ContactNotFound(String),

    /// Invalid contact fields
    #[error("Invalid contact: {0}")]
    InvalidContact(String),

    /// Desktop import payload error
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Address derivation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DerivationError {
    /// No index mapping to the requested group within the retry ceiling
    #[error("No address found for group {group} after {attempts} attempts")]
    GroupDerivationExhausted {
        /// Requested group
        group: u8,
        /// Candidate indexes tried
        attempts: u32,
    },

    /// Requested group does not exist
    #[error("Invalid group {group}: network has {group_count} groups")]
    InvalidGroup {
        /// Requested group
        group: u8,
        /// Groups on the network
        group_count: u8,
    },

    /// Every non-hardened index is excluded
    #[error("No free address index left")]
    IndexSpaceExhausted,

    /// Underlying key derivation failed
    #[error("Key derivation failed: {0}")]
    Key(String),
}

/// Desktop wallet import errors
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// Payload is not the expected JSON shape
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Payload version not understood
    #[error("Unsupported payload version: {0}")]
    UnsupportedVersion(u32),

    /// Wrong password or tampered ciphertext
    #[error("Could not decrypt payload")]
    Decryption,
}

impl Error {
    /// Check if error is a user-facing error (vs internal error)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidMnemonic(_)
                | Error::InvalidAddress(_)
                | Error::CannotUnsetMain(_)
                | Error::DuplicateContact(_)
                | Error::InvalidContact(_)
                | Error::Import(ImportError::Decryption)
                | Error::Derivation(DerivationError::GroupDerivationExhausted { .. })
        )
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidMnemonic(_) => {
                "The secret recovery phrase is invalid. Please check and try again.".to_string()
            }
            Error::InvalidAddress(_) => {
                "The address is invalid. Please check and try again.".to_string()
            }
            Error::CannotUnsetMain(_) => {
                "Choose another main address before removing this one.".to_string()
            }
            Error::Import(ImportError::Decryption) => {
                "Could not decrypt wallet with the given password.".to_string()
            }
            Error::Derivation(DerivationError::GroupDerivationExhausted { group, .. }) => {
                format!("Could not generate an address in group {}. Please try again.", group)
            }
            _ => self.to_string(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidMnemonic(_) | Error::InvalidSeed(_) => ErrorCategory::Keys,
            Error::Derivation(_) => ErrorCategory::Derivation,
            Error::InvalidAddress(_)
            | Error::AddressNotFound(_)
            | Error::DuplicateAddress(_)
            | Error::CannotUnsetMain(_) => ErrorCategory::Address,
            Error::DuplicateContact(_) | Error::ContactNotFound(_) | Error::InvalidContact(_) => {
                ErrorCategory::Contacts
            }
            Error::Import(_) => ErrorCategory::Import,
            Error::Serialization(_) => ErrorCategory::Internal,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Mnemonic/seed errors
    Keys,
    /// Address derivation errors
    Derivation,
    /// Wallet address set errors
    Address,
    /// Contact errors
    Contacts,
    /// Import payload errors
    Import,
    /// Internal/system errors
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Keys => write!(f, "Keys"),
            ErrorCategory::Derivation => write!(f, "Derivation"),
            ErrorCategory::Address => write!(f, "Address"),
            ErrorCategory::Contacts => write!(f, "Contacts"),
            ErrorCategory::Import => write!(f, "Import"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}
