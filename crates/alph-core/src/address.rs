//! Group-aware address derivation
//!
//! An Alephium P2PKH address is `base58(0x00 || blake2b-256(pubkey))`. Its
//! group is computed from a djb2 hint over the public key hash, so finding an
//! address in a particular group means walking candidate indexes until one
//! lands there.

use crate::error::{DerivationError, Error, Result};
use crate::keys::{KeyDerivation, MasterSeed};
use alph_params::{validate_group, DEFAULT_MAX_GROUP_ATTEMPTS, TOTAL_NUMBER_OF_GROUPS};
use blake2b_simd::Params as Blake2bParams;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Base58 address string
pub type AddressHash = String;

/// Highest non-hardened child index plus one
const INDEX_SPACE: u32 = 1 << 31;

const P2PKH_PREFIX: u8 = 0x00;
const P2SH_PREFIX: u8 = 0x02;
const P2C_PREFIX: u8 = 0x03;

/// Freshly derived address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressData {
    /// Base58 address
    pub hash: AddressHash,
    /// Child index on the account path
    pub index: u32,
    /// Address group
    pub group: u8,
    /// Compressed public key, hex encoded
    pub public_key: String,
}

/// Deriver limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeriverConfig {
    /// Groups on the network
    pub group_count: u8,
    /// Candidate indexes tried before giving up on a group
    pub max_group_attempts: u32,
}

impl Default for DeriverConfig {
    fn default() -> Self {
        Self {
            group_count: TOTAL_NUMBER_OF_GROUPS,
            max_group_attempts: DEFAULT_MAX_GROUP_ATTEMPTS,
        }
    }
}

/// Deterministic address derivation over a [`KeyDerivation`] capability
#[derive(Clone)]
pub struct AddressDeriver {
    derivation: Arc<dyn KeyDerivation>,
    config: DeriverConfig,
}

impl AddressDeriver {
    /// Create a deriver
    pub fn new(derivation: Arc<dyn KeyDerivation>, config: DeriverConfig) -> Self {
        Self { derivation, config }
    }

    /// Deriver limits
    pub fn config(&self) -> &DeriverConfig {
        &self.config
    }

    /// Derive the address at exactly `index`
    pub fn derive_at(
        &self,
        seed: &MasterSeed,
        index: u32,
    ) -> std::result::Result<AddressData, DerivationError> {
        let public_key = self.derivation.derive_public_key(seed, index)?;
        let pkh = blake2b_256(&public_key);
        let group = group_of_hash(&pkh, self.config.group_count);
        Ok(AddressData {
            hash: encode_p2pkh(&pkh),
            index,
            group,
            public_key: hex::encode(&public_key),
        })
    }

    /// Derive the next address
    ///
    /// The first candidate is `index_hint` (or 0), moved forward past any
    /// excluded index. With a `group_hint`, successive non-excluded indexes
    /// are tried until one lands in that group, up to
    /// `max_group_attempts` candidates.
    pub fn derive(
        &self,
        seed: &MasterSeed,
        group_hint: Option<u8>,
        index_hint: Option<u32>,
        excluded: &BTreeSet<u32>,
    ) -> std::result::Result<AddressData, DerivationError> {
        if let Some(group) = group_hint {
            validate_group(group, self.config.group_count).map_err(|_| {
                DerivationError::InvalidGroup {
                    group,
                    group_count: self.config.group_count,
                }
            })?;
        }

        let mut candidate = next_available_index(index_hint.unwrap_or(0), excluded)?;

        let Some(group) = group_hint else {
            return self.derive_at(seed, candidate);
        };

        let mut attempts = 0u32;
        while attempts < self.config.max_group_attempts {
            let data = self.derive_at(seed, candidate)?;
            attempts += 1;
            if data.group == group {
                debug!(
                    event = "address_derived",
                    group,
                    index = data.index,
                    attempts,
                    "Derived address for group"
                );
                return Ok(data);
            }
            candidate = match candidate.checked_add(1) {
                Some(next) if next < INDEX_SPACE => next_available_index(next, excluded)?,
                _ => return Err(DerivationError::IndexSpaceExhausted),
            };
        }

        Err(DerivationError::GroupDerivationExhausted { group, attempts })
    }
}

/// Smallest index at or after `start` not in `excluded`
fn next_available_index(
    start: u32,
    excluded: &BTreeSet<u32>,
) -> std::result::Result<u32, DerivationError> {
    let mut index = start;
    while excluded.contains(&index) {
        index = index
            .checked_add(1)
            .ok_or(DerivationError::IndexSpaceExhausted)?;
    }
    if index >= INDEX_SPACE {
        return Err(DerivationError::IndexSpaceExhausted);
    }
    Ok(index)
}

fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let hash = Blake2bParams::new().hash_length(32).hash(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_bytes());
    out
}

fn encode_p2pkh(pkh: &[u8; 32]) -> AddressHash {
    let mut bytes = Vec::with_capacity(33);
    bytes.push(P2PKH_PREFIX);
    bytes.extend_from_slice(pkh);
    bs58::encode(bytes).into_string()
}

fn djb2(bytes: &[u8]) -> u32 {
    bytes.iter().fold(5381u32, |hash, &b| {
        (hash << 5).wrapping_add(hash).wrapping_add(b as u32)
    })
}

fn xor_byte(value: u32) -> u8 {
    ((value >> 24) ^ (value >> 16) ^ (value >> 8) ^ value) as u8
}

fn group_of_hash(hash: &[u8; 32], group_count: u8) -> u8 {
    let hint = djb2(hash) | 1;
    xor_byte(hint) % group_count.max(1)
}

/// Decode a base58 address into its type prefix and 32-byte payload
pub fn decode_address(address: &str) -> Result<(u8, [u8; 32])> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| Error::InvalidAddress(e.to_string()))?;
    let (prefix, payload) = bytes
        .split_first()
        .ok_or_else(|| Error::InvalidAddress("empty address".to_string()))?;

    match *prefix {
        P2PKH_PREFIX | P2SH_PREFIX | P2C_PREFIX if payload.len() == 32 => {
            let mut out = [0u8; 32];
            out.copy_from_slice(payload);
            Ok((*prefix, out))
        }
        P2PKH_PREFIX | P2SH_PREFIX | P2C_PREFIX => Err(Error::InvalidAddress(format!(
            "expected 32-byte payload, got {}",
            payload.len()
        ))),
        other => Err(Error::InvalidAddress(format!(
            "unsupported address type {}",
            other
        ))),
    }
}

/// Group of a base58 address
pub fn group_of_address(address: &str, group_count: u8) -> Result<u8> {
    let (prefix, payload) = decode_address(address)?;
    if prefix == P2C_PREFIX {
        return Ok(payload[31] % group_count.max(1));
    }
    Ok(group_of_hash(&payload, group_count))
}
