//! Platform authentication boundary
//!
//! The host owns the PIN pad and the biometric prompt. Prompts may suspend
//! indefinitely and resolve to [`AuthError::Cancelled`] when dismissed.

use crate::error::AuthError;
use alph_core::WalletId;
use async_trait::async_trait;
use std::fmt;
use zeroize::Zeroizing;

/// Credential released by a prompt
#[derive(Clone)]
pub struct Secret(Zeroizing<Vec<u8>>);

impl Secret {
    /// Wrap raw bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Wrap a PIN
    pub fn from_pin(pin: &str) -> Self {
        Self::new(pin.as_bytes().to_vec())
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// Bytes as UTF-8, for PIN secrets
    pub fn as_pin(&self) -> Result<&str, AuthError> {
        std::str::from_utf8(self.as_bytes()).map_err(|_| AuthError::InvalidCredential)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

/// Result of the biometric capability query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiometricAvailability {
    /// Hardware present and enrolled
    Available,
    /// Hardware present, nothing enrolled
    NotEnrolled,
    /// No biometric hardware
    Unsupported,
    /// Enrollment changed since the secret was registered
    Revoked,
}

impl BiometricAvailability {
    /// Whether a biometric prompt can be shown
    pub fn is_available(self) -> bool {
        matches!(self, BiometricAvailability::Available)
    }
}

/// Host authenticator
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Query biometric capability
    async fn biometric_availability(&self) -> BiometricAvailability;

    /// Ask for the PIN of `wallet_id`
    async fn prompt_pin(&self, wallet_id: &WalletId) -> Result<Secret, AuthError>;

    /// Ask the platform to release the biometric secret of `wallet_id`
    async fn prompt_biometric(&self, wallet_id: &WalletId) -> Result<Secret, AuthError>;

    /// Hand a biometric secret to the platform keystore
    async fn register_biometric_secret(
        &self,
        wallet_id: &WalletId,
        secret: &[u8],
    ) -> Result<(), AuthError>;

    /// Forget the biometric secret of `wallet_id`
    async fn remove_biometric_secret(&self, _wallet_id: &WalletId) -> Result<(), AuthError> {
        Ok(())
    }
}
