//! Alephium network parameters and constants
//!
//! Group layout, BIP-44 coin type and derivation path, and explorer paging
//! constants shared by the wallet crates.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod network;

pub use network::{Network, NetworkType};

/// Number of address groups on every Alephium network.
pub const TOTAL_NUMBER_OF_GROUPS: u8 = 4;

/// Upper bound of candidate indexes tried when deriving an address for a group.
pub const DEFAULT_MAX_GROUP_ATTEMPTS: u32 = 1 << 16;

/// Consecutive unused addresses scanned before discovery stops.
pub const DEFAULT_DISCOVERY_GAP_LIMIT: u32 = 20;

/// Shortest mnemonic accepted by the node (in words).
pub const MIN_MNEMONIC_WORDS: usize = 12;

/// Error types for parameter operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid network specified
    #[error("Invalid network: {0}")]
    InvalidNetwork(String),

    /// Group outside of the network's group range
    #[error("Invalid group {group}: network has {group_count} groups")]
    InvalidGroup {
        /// Requested group
        group: u8,
        /// Groups on the network
        group_count: u8,
    },
}

/// Result type for parameter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Check that `group` exists on a network with `group_count` groups.
pub fn validate_group(group: u8, group_count: u8) -> Result<()> {
    if group >= group_count {
        return Err(Error::InvalidGroup { group, group_count });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_group() {
        assert!(validate_group(0, TOTAL_NUMBER_OF_GROUPS).is_ok());
        assert!(validate_group(3, TOTAL_NUMBER_OF_GROUPS).is_ok());
        assert!(matches!(
            validate_group(4, TOTAL_NUMBER_OF_GROUPS),
            Err(Error::InvalidGroup { group: 4, group_count: 4 })
        ));
    }
}
