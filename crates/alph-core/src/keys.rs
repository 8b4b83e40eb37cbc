//! Mnemonic, seed and HD key derivation
//!
//! Mnemonics are BIP-39 English phrases. Child public keys are derived along
//! the BIP-44 path `m/44'/1234'/0'/0/index` through the [`KeyDerivation`]
//! capability so platforms can substitute a hardware-backed implementation.

use crate::error::{DerivationError, Error, Result};
use alph_params::{Network, MIN_MNEMONIC_WORDS};
use bip32::{ChildNumber, DerivationPath, XPrv};
use bip39::{Language, Mnemonic};
use rand::RngCore;
use std::fmt;
use zeroize::Zeroizing;

/// Validated BIP-39 mnemonic phrase
///
/// The phrase is normalized to single spaces and lowercase and zeroed when
/// dropped. `Debug` never prints the words.
#[derive(Clone, PartialEq, Eq)]
pub struct MnemonicPhrase(Zeroizing<String>);

impl MnemonicPhrase {
    /// Parse and validate a phrase
    pub fn parse(phrase: &str) -> Result<Self> {
        let normalized: Zeroizing<String> = Zeroizing::new(
            phrase
                .split_whitespace()
                .map(|word| word.to_lowercase())
                .collect::<Vec<_>>()
                .join(" "),
        );

        let word_count = normalized.split(' ').filter(|w| !w.is_empty()).count();
        if word_count < MIN_MNEMONIC_WORDS {
            return Err(Error::InvalidMnemonic(format!(
                "expected at least {} words, got {}",
                MIN_MNEMONIC_WORDS, word_count
            )));
        }

        Mnemonic::parse_in_normalized(Language::English, &normalized)
            .map_err(|e| Error::InvalidMnemonic(e.to_string()))?;

        Ok(Self(normalized))
    }

    /// Phrase words
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of words
    pub fn word_count(&self) -> usize {
        self.0.split(' ').count()
    }

    /// Derive the 64-byte BIP-39 seed
    pub fn to_master_seed(&self, passphrase: &str) -> Result<MasterSeed> {
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, &self.0)
            .map_err(|e| Error::InvalidMnemonic(e.to_string()))?;
        Ok(MasterSeed::new(mnemonic.to_seed(passphrase)))
    }
}

impl fmt::Debug for MnemonicPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MnemonicPhrase([REDACTED; {} words])", self.word_count())
    }
}

/// BIP-39 master seed
#[derive(Clone)]
pub struct MasterSeed(Zeroizing<[u8; 64]>);

impl MasterSeed {
    /// Wrap raw seed bytes
    pub fn new(bytes: [u8; 64]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Seed bytes
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Debug for MasterSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSeed([REDACTED])")
    }
}

/// Generate new random mnemonic
///
/// # Arguments
/// * `word_count` - Number of words in mnemonic (12, 18, or 24). Defaults to 24.
pub fn generate_mnemonic(word_count: Option<u32>) -> Result<MnemonicPhrase> {
    // 12 words = 16 bytes, 18 words = 24 bytes, 24 words = 32 bytes
    let entropy_size = match word_count.unwrap_or(24) {
        12 => 16,
        18 => 24,
        24 => 32,
        other => {
            return Err(Error::InvalidMnemonic(format!(
                "unsupported word count {}",
                other
            )))
        }
    };

    let mut entropy = Zeroizing::new(vec![0u8; entropy_size]);
    rand::thread_rng().fill_bytes(&mut entropy);

    let mnemonic =
        Mnemonic::from_entropy(&entropy).map_err(|e| Error::InvalidMnemonic(e.to_string()))?;
    let phrase = Zeroizing::new(mnemonic.to_string());
    MnemonicPhrase::parse(&phrase)
}

/// Child key derivation capability
pub trait KeyDerivation: Send + Sync {
    /// Compressed secp256k1 public key at the non-hardened child `index`
    fn derive_public_key(
        &self,
        seed: &MasterSeed,
        index: u32,
    ) -> std::result::Result<Vec<u8>, DerivationError>;
}

/// BIP-32 secp256k1 derivation along the network account path
#[derive(Debug, Clone)]
pub struct Bip44Derivation {
    account_path: DerivationPath,
}

impl Bip44Derivation {
    /// Derivation for the account path of `network`
    pub fn new(network: &Network) -> Result<Self> {
        let account_path = network
            .account_path()
            .parse::<DerivationPath>()
            .map_err(|e| Error::Derivation(DerivationError::Key(e.to_string())))?;
        Ok(Self { account_path })
    }

    /// Account path used by this derivation
    pub fn account_path(&self) -> &DerivationPath {
        &self.account_path
    }
}

impl KeyDerivation for Bip44Derivation {
    fn derive_public_key(
        &self,
        seed: &MasterSeed,
        index: u32,
    ) -> std::result::Result<Vec<u8>, DerivationError> {
        let child = ChildNumber::new(index, false).map_err(|e| DerivationError::Key(e.to_string()))?;
        let account = XPrv::derive_from_path(seed.as_bytes(), &self.account_path)
            .map_err(|e| DerivationError::Key(e.to_string()))?;
        let key = account
            .derive_child(child)
            .map_err(|e| DerivationError::Key(e.to_string()))?;
        Ok(key.public_key().to_bytes().to_vec())
    }
}
