//! Security and encryption primitives
//!
//! ChaCha20-Poly1305 credential blobs, Argon2id key derivation from the
//! wallet PIN and a PHC-string PIN verifier.

use crate::{Error, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params, ParamsBuilder, Version,
};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

const BLOB_VERSION: u8 = 1;
const ALGORITHM_CHACHA20: u8 = 1;
const HEADER_LENGTH: usize = 2 + 12;

/// Minimum salt length accepted by [`derive_key_bytes`]
pub const MIN_SALT_LENGTH: usize = 16;

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Iterations
    pub iterations: u32,
    /// Lanes
    pub parallelism: u32,
}

impl Default for KdfParams {
    /// Memory: 64 MiB (65536 KiB), Iterations: 3, Parallelism: 4
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    /// Cheap profile for tests and developer tooling. Never use for real wallets.
    pub const fn low_cost() -> Self {
        Self {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        let params: Params = ParamsBuilder::new()
            .m_cost(self.memory_kib)
            .t_cost(self.iterations)
            .p_cost(self.parallelism)
            .output_len(32)
            .build()
            .map_err(|e| Error::Encryption(e.to_string()))?;
        Ok(Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Symmetric key for credential blobs
#[derive(Clone)]
pub struct MasterKey {
    key: Zeroizing<[u8; 32]>,
}

impl MasterKey {
    /// Generate new random key
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(key.as_mut_slice());
        Self { key }
    }

    /// Create from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(Error::Encryption("Invalid key length".to_string()));
        }
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Get key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    /// Encrypt data
    ///
    /// Format: `[version(1)][algorithm(1)][nonce(12)][ciphertext]`
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key[..]));

        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| Error::Encryption(e.to_string()))?;

        let mut result = Vec::with_capacity(HEADER_LENGTH + ciphertext.len());
        result.push(BLOB_VERSION);
        result.push(ALGORITHM_CHACHA20);
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Decrypt data
    pub fn decrypt(&self, data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if data.len() < HEADER_LENGTH {
            return Err(Error::Encryption("Invalid ciphertext length".to_string()));
        }
        if data[0] != BLOB_VERSION {
            return Err(Error::Encryption(format!(
                "Unsupported encryption version: {}",
                data[0]
            )));
        }
        if data[1] != ALGORITHM_CHACHA20 {
            return Err(Error::Encryption(format!(
                "Algorithm mismatch: expected ChaCha20-Poly1305 (1), got {}",
                data[1]
            )));
        }

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key[..]));
        cipher
            .decrypt(Nonce::from_slice(&data[2..HEADER_LENGTH]), &data[HEADER_LENGTH..])
            .map(Zeroizing::new)
            .map_err(|e| Error::Encryption(e.to_string()))
    }
}

/// Derive raw key bytes from a secret using Argon2id
pub fn derive_key_bytes(secret: &str, salt: &[u8], params: &KdfParams) -> Result<MasterKey> {
    if salt.len() < MIN_SALT_LENGTH {
        return Err(Error::Encryption("Salt too short".to_string()));
    }

    let mut key = Zeroizing::new([0u8; 32]);
    params
        .argon2()?
        .hash_password_into(secret.as_bytes(), salt, key.as_mut_slice())
        .map_err(|e| Error::Encryption(e.to_string()))?;
    MasterKey::from_bytes(&key[..])
}

/// Generate random salt (32 bytes)
pub fn generate_salt() -> [u8; 32] {
    let mut salt = [0u8; 32];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Argon2id PHC-string verifier for a PIN
///
/// Lets unlock tell a wrong PIN apart from a blob that no longer decrypts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinVerifier {
    hash: String,
}

impl PinVerifier {
    /// Hash a PIN
    pub fn hash(pin: &str, params: &KdfParams) -> Result<Self> {
        if pin.is_empty() {
            return Err(Error::Validation("PIN is empty".to_string()));
        }
        let salt = SaltString::generate(&mut OsRng);
        let hash = params
            .argon2()?
            .hash_password(pin.as_bytes(), &salt)
            .map_err(|e| Error::Encryption(e.to_string()))?
            .to_string();
        Ok(Self { hash })
    }

    /// Verify a PIN
    ///
    /// Cost parameters are read back from the PHC string.
    pub fn verify(&self, pin: &str) -> Result<bool> {
        let parsed_hash =
            PasswordHash::new(&self.hash).map_err(|e| Error::Encryption(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(pin.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// PHC string for storage
    pub fn hash_string(&self) -> &str {
        &self.hash
    }

    /// Load from stored hash
    pub fn from_hash(hash: String) -> Self {
        Self { hash }
    }
}
