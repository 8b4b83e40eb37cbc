//! Wallet session engine
//!
//! Ties credential storage, address derivation, metadata and sync together
//! behind one [`SessionStateMachine`]:
//!
//! - **Unlock**: PIN or biometric prompt through the host [`Authenticator`],
//!   bounded re-prompting on cancellation, automatic PIN fallback when
//!   biometrics are revoked
//! - **Lifecycle**: foreground resume unlocks, backgrounding locks unless a
//!   camera screen is open, the mnemonic is purged on every lock
//! - **Wallets**: create, import desktop exports, switch and delete
//! - **Addresses**: lazy load per session, group-aware generation, main
//!   address bookkeeping, discovery after import

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod addresses;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod retry;
pub mod session;
pub mod state;
mod wallets;

pub use addresses::NewAddressRequest;
pub use auth::{Authenticator, BiometricAvailability, Secret};
pub use config::SessionConfig;
pub use error::{AuthError, Error, Result};
pub use logging::init_logging;
pub use retry::RetryPolicy;
pub use session::{Collaborators, SessionStateMachine};
pub use state::{SessionEvent, SessionState, UnlockOutcome};
