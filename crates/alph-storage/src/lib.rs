//! Credential and metadata storage for the Alephium wallet
//!
//! ## Security Features
//!
//! - **Credential blobs**: ChaCha20-Poly1305 with a versioned header
//! - **PIN KDF**: Argon2id with 64 MiB memory, 3 iterations, 4 lanes
//! - **PIN verifier**: PHC string stored beside the sealed seed
//! - **Biometric unlock**: mnemonic sealed under a random key held by the
//!   platform authenticator
//!
//! Wallet metadata (address labels, colors, main flag, contacts) is stored as
//! one JSON document per wallet in memory or SQLite.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod credentials;
pub mod database;
pub mod error;
pub mod metadata;
pub mod models;
pub mod secure_storage;
pub mod security;

pub use credentials::{SecureCredentialStore, MAX_WALLET_NAME_LENGTH};
pub use database::SqliteMetadataBackend;
pub use error::{Error, Result};
pub use metadata::{
    validate_color, MemoryMetadataBackend, MetadataBackend, WalletMetadataStore, MAX_LABEL_LENGTH,
};
pub use models::{AddressMetadata, StoredWallet, WalletMetadata};
pub use secure_storage::{MemorySecureStorage, SecureStorage};
pub use security::{KdfParams, MasterKey, PinVerifier};
