//! Persisted records

use crate::security::KdfParams;
use alph_core::{Address, AuthType, Contact, WalletId};
use serde::{Deserialize, Serialize};

/// Wallet index entry kept in secure storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredWallet {
    /// Wallet id
    pub id: WalletId,
    /// Display name
    pub name: String,
    /// Unlock method
    pub auth_type: AuthType,
    /// Secure storage key of the PIN-sealed mnemonic
    pub encrypted_seed_ref: String,
    /// Creation time (unix seconds)
    pub created_at: i64,
}

impl StoredWallet {
    /// Model without mnemonic
    pub fn to_wallet(&self) -> alph_core::Wallet {
        alph_core::Wallet {
            id: self.id.clone(),
            name: self.name.clone(),
            auth_type: self.auth_type,
            encrypted_seed_ref: self.encrypted_seed_ref.clone(),
            mnemonic: None,
        }
    }
}

/// PIN-sealed mnemonic record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PinSealedSeed {
    /// Argon2id salt, hex
    pub salt: String,
    /// PHC verifier
    pub verifier: String,
    /// ChaCha20-Poly1305 blob, hex
    pub blob: String,
    /// Cost parameters the key was derived with
    #[serde(default)]
    pub kdf: KdfParams,
}

/// Persisted address settings, keyed by index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressMetadata {
    /// Child index
    pub index: u32,
    /// Label
    #[serde(default)]
    pub label: Option<String>,
    /// Color
    pub color: String,
    /// Main address flag
    #[serde(default)]
    pub is_default: bool,
}

impl From<&Address> for AddressMetadata {
    fn from(address: &Address) -> Self {
        Self {
            index: address.index,
            label: address.settings.label.clone(),
            color: address.settings.color.clone(),
            is_default: address.settings.is_default,
        }
    }
}

impl AddressMetadata {
    /// Settings value
    pub fn settings(&self) -> alph_core::AddressSettings {
        alph_core::AddressSettings {
            label: self.label.clone(),
            color: self.color.clone(),
            is_default: self.is_default,
        }
    }
}

/// Durable settings of one wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletMetadata {
    /// Wallet id
    pub id: WalletId,
    /// Address settings, ordered by index
    #[serde(default)]
    pub addresses: Vec<AddressMetadata>,
    /// Contacts
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

impl WalletMetadata {
    /// Empty metadata document
    pub fn new(id: impl Into<WalletId>) -> Self {
        Self {
            id: id.into(),
            addresses: Vec::new(),
            contacts: Vec::new(),
        }
    }

    /// Address settings at `index`
    pub fn address(&self, index: u32) -> Option<&AddressMetadata> {
        self.addresses.iter().find(|a| a.index == index)
    }
}
