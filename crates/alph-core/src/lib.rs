//! Alephium wallet core
//!
//! Mnemonic and seed handling, pluggable HD key derivation, group-aware
//! address derivation, and the wallet, address and contact models shared by
//! the storage, sync and session crates.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod address;
pub mod contacts;
pub mod error;
pub mod import;
pub mod keys;
pub mod wallet;

pub use address::{
    decode_address, group_of_address, AddressData, AddressDeriver, AddressHash, DeriverConfig,
};
pub use contacts::{Contact, ContactList};
pub use error::{DerivationError, Error, ErrorCategory, ImportError, Result};
pub use import::{
    decrypt_import_payload, seal_export_payload, EncryptedPayload, ImportedAddress,
    WalletImportData,
};
pub use keys::{generate_mnemonic, Bip44Derivation, KeyDerivation, MasterSeed, MnemonicPhrase};
pub use wallet::{
    random_label_color, Address, AddressSettings, AuthType, Wallet, WalletAddresses, WalletId,
    LABEL_COLORS,
};
