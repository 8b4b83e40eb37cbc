//! Alephium network definitions

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Network type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Mainnet
    Mainnet,
    /// Testnet
    Testnet,
    /// Devnet (local node)
    Devnet,
}

impl FromStr for NetworkType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "devnet" => Ok(Self::Devnet),
            other => Err(crate::Error::InvalidNetwork(other.to_string())),
        }
    }
}

/// Network configuration
#[derive(Debug, Clone)]
pub struct Network {
    /// Network type
    pub network_type: NetworkType,
    /// Human-readable name
    pub name: &'static str,
    /// Coin type (BIP-44)
    pub coin_type: u32,
    /// Number of address groups
    pub group_count: u8,
    /// Transactions returned per explorer page
    pub explorer_page_size: u32,
}

impl Network {
    /// Get mainnet parameters
    pub const fn mainnet() -> Self {
        Self {
            network_type: NetworkType::Mainnet,
            name: "mainnet",
            coin_type: 1234,
            group_count: crate::TOTAL_NUMBER_OF_GROUPS,
            explorer_page_size: 20,
        }
    }

    /// Get testnet parameters
    pub const fn testnet() -> Self {
        Self {
            network_type: NetworkType::Testnet,
            name: "testnet",
            coin_type: 1234,
            group_count: crate::TOTAL_NUMBER_OF_GROUPS,
            explorer_page_size: 20,
        }
    }

    /// Get devnet parameters
    pub const fn devnet() -> Self {
        Self {
            network_type: NetworkType::Devnet,
            name: "devnet",
            coin_type: 1234,
            group_count: crate::TOTAL_NUMBER_OF_GROUPS,
            explorer_page_size: 20,
        }
    }

    /// Get parameters for a network type
    pub const fn from_type(network_type: NetworkType) -> Self {
        match network_type {
            NetworkType::Mainnet => Self::mainnet(),
            NetworkType::Testnet => Self::testnet(),
            NetworkType::Devnet => Self::devnet(),
        }
    }

    /// Account-level derivation path; the address index is appended as a
    /// non-hardened child.
    pub fn account_path(&self) -> String {
        format!("m/44'/{}'/0'/0", self.coin_type)
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::mainnet()
    }
}
