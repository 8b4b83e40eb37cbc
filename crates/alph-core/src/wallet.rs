//! Wallet and address set models

use crate::address::{AddressData, AddressHash};
use crate::error::{Error, Result};
use crate::keys::MnemonicPhrase;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Wallet identifier
pub type WalletId = String;

/// Colors offered for address labels
pub const LABEL_COLORS: [&str; 8] = [
    "#3ED282", "#FF5D51", "#FFC24C", "#4CB0FF", "#9D68FF", "#FF8AD8", "#2FD1C4", "#A0A0A0",
];

/// Pick a label color from [`LABEL_COLORS`]
pub fn random_label_color() -> String {
    LABEL_COLORS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(LABEL_COLORS[0])
        .to_string()
}

/// How the user unlocks a wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    /// PIN-derived key
    Pin,
    /// Platform biometric prompt
    Biometrics,
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthType::Pin => write!(f, "pin"),
            AuthType::Biometrics => write!(f, "biometrics"),
        }
    }
}

/// User-editable address settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressSettings {
    /// Optional label
    #[serde(default)]
    pub label: Option<String>,
    /// Label color, `#RRGGBB`
    pub color: String,
    /// Main ("default") address flag
    #[serde(default)]
    pub is_default: bool,
}

impl AddressSettings {
    /// Settings with a random color
    pub fn new(label: Option<String>, is_default: bool) -> Self {
        Self {
            label,
            color: random_label_color(),
            is_default,
        }
    }
}

/// Address owned by a wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    /// Base58 address
    pub hash: AddressHash,
    /// Child index
    pub index: u32,
    /// Address group
    pub group: u8,
    /// Compressed public key, hex encoded
    pub public_key: String,
    /// Settings
    pub settings: AddressSettings,
}

impl Address {
    /// Build from derivation output
    pub fn from_data(data: AddressData, settings: AddressSettings) -> Self {
        Self {
            hash: data.hash,
            index: data.index,
            group: data.group,
            public_key: data.public_key,
            settings,
        }
    }

    /// Whether this is the wallet's main address
    pub fn is_main(&self) -> bool {
        self.settings.is_default
    }
}

/// Address set of a wallet, ordered by index
///
/// Holds exactly one main address whenever it is non-empty. Mutations return
/// every address whose settings changed so callers can persist them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletAddresses {
    addresses: Vec<Address>,
}

impl WalletAddresses {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from addresses, repairing the main flag if needed
    ///
    /// Without a flagged main address the lowest index becomes main.
    pub fn from_addresses(mut addresses: Vec<Address>) -> Result<Self> {
        addresses.sort_by_key(|a| a.index);
        let mut set = Self::new();
        for address in addresses {
            set.insert(address)?;
        }
        Ok(set)
    }

    /// Insert an address
    ///
    /// The first address always becomes main. A new main address demotes the
    /// previous one.
    pub fn insert(&mut self, mut address: Address) -> Result<Vec<Address>> {
        if self
            .addresses
            .iter()
            .any(|a| a.hash == address.hash || a.index == address.index)
        {
            return Err(Error::DuplicateAddress(address.hash));
        }

        let mut changed = Vec::new();
        if self.addresses.is_empty() {
            address.settings.is_default = true;
        } else if address.settings.is_default {
            for existing in self.addresses.iter_mut().filter(|a| a.is_main()) {
                existing.settings.is_default = false;
                changed.push(existing.clone());
            }
        }

        changed.push(address.clone());
        let position = self
            .addresses
            .partition_point(|a| a.index < address.index);
        self.addresses.insert(position, address);
        Ok(changed)
    }

    /// Remove an address, promoting the lowest remaining index if it was main
    pub fn remove(&mut self, hash: &str) -> Result<(Address, Option<Address>)> {
        let position = self
            .addresses
            .iter()
            .position(|a| a.hash == hash)
            .ok_or_else(|| Error::AddressNotFound(hash.to_string()))?;
        let removed = self.addresses.remove(position);

        let promoted = if removed.is_main() {
            self.addresses.first_mut().map(|first| {
                first.settings.is_default = true;
                first.clone()
            })
        } else {
            None
        };
        Ok((removed, promoted))
    }

    /// Make `hash` the main address
    pub fn set_main(&mut self, hash: &str) -> Result<Vec<Address>> {
        if !self.addresses.iter().any(|a| a.hash == hash) {
            return Err(Error::AddressNotFound(hash.to_string()));
        }
        let mut changed = Vec::new();
        for address in self.addresses.iter_mut() {
            let should_be_main = address.hash == hash;
            if address.settings.is_default != should_be_main {
                address.settings.is_default = should_be_main;
                changed.push(address.clone());
            }
        }
        Ok(changed)
    }

    /// Replace the settings of `hash`
    ///
    /// Clearing the main flag is rejected; promote another address instead.
    pub fn update_settings(&mut self, hash: &str, settings: AddressSettings) -> Result<Vec<Address>> {
        let current = self
            .get(hash)
            .ok_or_else(|| Error::AddressNotFound(hash.to_string()))?;
        if current.is_main() && !settings.is_default {
            return Err(Error::CannotUnsetMain(hash.to_string()));
        }

        let becomes_main = settings.is_default;
        let mut changed = if becomes_main {
            self.set_main(hash)?
        } else {
            Vec::new()
        };
        changed.retain(|a| a.hash != hash);

        if let Some(address) = self.addresses.iter_mut().find(|a| a.hash == hash) {
            address.settings = settings;
            changed.push(address.clone());
        }
        Ok(changed)
    }

    /// Address by hash
    pub fn get(&self, hash: &str) -> Option<&Address> {
        self.addresses.iter().find(|a| a.hash == hash)
    }

    /// Main address
    pub fn main(&self) -> Option<&Address> {
        self.addresses.iter().find(|a| a.is_main())
    }

    /// Used indexes
    pub fn indexes(&self) -> BTreeSet<u32> {
        self.addresses.iter().map(|a| a.index).collect()
    }

    /// Address hashes in index order
    pub fn hashes(&self) -> Vec<AddressHash> {
        self.addresses.iter().map(|a| a.hash.clone()).collect()
    }

    /// Addresses in index order
    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.addresses.iter()
    }

    /// Number of addresses
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// True when the set has no address
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// A stored wallet
///
/// `mnemonic` is only populated while the session is unlocked.
#[derive(Debug, Clone)]
pub struct Wallet {
    /// Wallet id
    pub id: WalletId,
    /// Display name
    pub name: String,
    /// Unlock method
    pub auth_type: AuthType,
    /// Secure storage key of the encrypted seed
    pub encrypted_seed_ref: String,
    /// Mnemonic while unlocked
    pub mnemonic: Option<MnemonicPhrase>,
}

impl Wallet {
    /// Drop the in-memory mnemonic
    pub fn purge_mnemonic(&mut self) {
        self.mnemonic = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(index: u32, is_default: bool) -> Address {
        Address {
            hash: format!("addr{}", index),
            index,
            group: (index % 4) as u8,
            public_key: String::new(),
            settings: AddressSettings {
                label: None,
                color: "#FFFFFF".to_string(),
                is_default,
            },
        }
    }

    fn main_count(set: &WalletAddresses) -> usize {
        set.iter().filter(|a| a.is_main()).count()
    }

    #[test]
    fn test_first_address_becomes_main() {
        let mut set = WalletAddresses::new();
        let changed = set.insert(address(3, false)).unwrap();
        assert!(changed[0].is_main());
        assert_eq!(set.main().unwrap().index, 3);
    }

    #[test]
    fn test_new_main_demotes_previous() {
        let mut set = WalletAddresses::new();
        set.insert(address(0, true)).unwrap();
        let changed = set.insert(address(1, true)).unwrap();
        assert_eq!(changed.len(), 2);
        assert_eq!(set.main().unwrap().index, 1);
        assert_eq!(main_count(&set), 1);
    }

    #[test]
    fn test_from_addresses_promotes_lowest_index() {
        let set = WalletAddresses::from_addresses(vec![address(3, false), address(0, false)]).unwrap();
        assert_eq!(set.main().unwrap().index, 0);
        assert_eq!(main_count(&set), 1);

        let flagged = WalletAddresses::from_addresses(vec![address(5, false), address(2, true)]).unwrap();
        assert_eq!(flagged.main().unwrap().index, 2);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut set = WalletAddresses::new();
        set.insert(address(0, true)).unwrap();
        assert!(matches!(
            set.insert(address(0, false)),
            Err(Error::DuplicateAddress(_))
        ));
    }

    #[test]
    fn test_removing_main_promotes_lowest_index() {
        let mut set = WalletAddresses::new();
        set.insert(address(2, false)).unwrap();
        set.insert(address(5, false)).unwrap();
        set.insert(address(4, true)).unwrap();

        let (removed, promoted) = set.remove("addr4").unwrap();
        assert_eq!(removed.index, 4);
        assert_eq!(promoted.unwrap().index, 2);
        assert_eq!(main_count(&set), 1);
    }

    #[test]
    fn test_removing_last_address_leaves_empty_set() {
        let mut set = WalletAddresses::new();
        set.insert(address(0, true)).unwrap();
        let (_, promoted) = set.remove("addr0").unwrap();
        assert!(promoted.is_none());
        assert!(set.is_empty());
    }

    #[test]
    fn test_cannot_unset_main() {
        let mut set = WalletAddresses::new();
        set.insert(address(0, true)).unwrap();
        let mut settings = set.get("addr0").unwrap().settings.clone();
        settings.is_default = false;
        assert!(matches!(
            set.update_settings("addr0", settings),
            Err(Error::CannotUnsetMain(_))
        ));
    }

    #[test]
    fn test_update_settings_to_main_moves_flag() {
        let mut set = WalletAddresses::new();
        set.insert(address(0, true)).unwrap();
        set.insert(address(1, false)).unwrap();
        let settings = AddressSettings {
            label: Some("savings".to_string()),
            color: "#000000".to_string(),
            is_default: true,
        };
        let changed = set.update_settings("addr1", settings).unwrap();
        assert_eq!(changed.len(), 2);
        assert_eq!(set.main().unwrap().settings.label.as_deref(), Some("savings"));
        assert_eq!(main_count(&set), 1);
    }

    #[test]
    fn test_addresses_kept_in_index_order() {
        let set = WalletAddresses::from_addresses(vec![
            address(7, false),
            address(1, false),
            address(3, true),
        ])
        .unwrap();
        let indexes: Vec<u32> = set.iter().map(|a| a.index).collect();
        assert_eq!(indexes, vec![1, 3, 7]);
        assert_eq!(set.main().unwrap().index, 3);
    }

    #[test]
    fn test_random_label_color_from_palette() {
        let color = random_label_color();
        assert!(LABEL_COLORS.contains(&color.as_str()));
    }
}
