//! Session state and notifications

use crate::error::AuthError;
use alph_core::WalletId;
use std::fmt;

/// Lock state of the session
///
/// Mnemonic material may only exist in memory while `Unlocked`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No mnemonic in memory
    #[default]
    Locked,
    /// Prompting for credentials
    Unlocking,
    /// Mnemonic in memory
    Unlocked,
    /// Credentials could not be used
    AuthenticationFailed(AuthError),
}

impl SessionState {
    /// Whether the mnemonic is available
    pub fn is_unlocked(&self) -> bool {
        matches!(self, SessionState::Unlocked)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Locked => write!(f, "locked"),
            SessionState::Unlocking => write!(f, "unlocking"),
            SessionState::Unlocked => write!(f, "unlocked"),
            SessionState::AuthenticationFailed(_) => write!(f, "authentication_failed"),
        }
    }
}

/// Successful unlock result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// Wallet unlocked
    Unlocked {
        /// Unlocked wallet
        wallet_id: WalletId,
    },
    /// Nothing to unlock; route to onboarding or wallet selection
    NoStoredWallet {
        /// Whether other wallets remain after the active one was deleted
        other_wallets_exist: bool,
    },
}

/// Session notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// State changed
    StateChanged(SessionState),
    /// Biometric unlock turned off after biometrics became unavailable
    BiometricsDisabled {
        /// Wallet
        wallet_id: WalletId,
    },
    /// No active wallet
    NoStoredWallet {
        /// Whether other wallets exist
        other_wallets_exist: bool,
    },
    /// Address set loaded for the session
    AddressesInitialized {
        /// Wallet
        wallet_id: WalletId,
        /// Addresses loaded
        count: usize,
    },
    /// User dismissed an unlock prompt
    AuthenticationPromptCancelled,
    /// Mnemonic purged
    Locked,
}
