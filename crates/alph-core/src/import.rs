//! Desktop wallet export payloads
//!
//! The desktop wallet shares a wallet as JSON `{version, salt, iv, encrypted}`
//! with hex fields. The key is PBKDF2-HMAC-SHA256 (10 000 rounds) over the
//! export password; the body is AES-256-GCM with a 64-byte IV and the tag
//! appended to the ciphertext.

use crate::contacts::Contact;
use crate::error::{ImportError, Result};
use aes_gcm::aead::consts::U64;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroizing;

type ExportCipher = AesGcm<Aes256, U64>;

/// Payload version understood by this crate
pub const PAYLOAD_VERSION: u32 = 1;

const PBKDF2_ROUNDS: u32 = 10_000;
const SALT_LENGTH: usize = 64;
const IV_LENGTH: usize = 64;

/// Encrypted payload as exchanged with the desktop wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Format version
    pub version: u32,
    /// PBKDF2 salt, hex
    pub salt: String,
    /// AES-GCM IV, hex
    pub iv: String,
    /// Ciphertext with tag, hex
    pub encrypted: String,
}

impl EncryptedPayload {
    /// Parse the JSON text scanned from the desktop QR code
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ImportError::InvalidPayload(e.to_string()).into())
    }

    /// Serialize to JSON text
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Address entry of an import payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedAddress {
    /// Child index
    pub index: u32,
    /// Label
    #[serde(default)]
    pub label: Option<String>,
    /// Color
    #[serde(default)]
    pub color: Option<String>,
    /// Main address flag
    #[serde(default)]
    pub is_default: bool,
}

/// Decrypted wallet export
#[derive(Clone, Serialize, Deserialize)]
pub struct WalletImportData {
    /// Mnemonic words
    pub mnemonic: Zeroizing<String>,
    /// Addresses to restore
    #[serde(default)]
    pub addresses: Vec<ImportedAddress>,
    /// Contacts to restore
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

impl fmt::Debug for WalletImportData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletImportData")
            .field("mnemonic", &"[REDACTED]")
            .field("addresses", &self.addresses)
            .field("contacts", &self.contacts)
            .finish()
    }
}

fn derive_key(password: &str, salt: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut key[..]);
    key
}

fn decode_hex(field: &str, value: &str) -> std::result::Result<Vec<u8>, ImportError> {
    hex::decode(value).map_err(|e| ImportError::InvalidPayload(format!("{}: {}", field, e)))
}

/// Decrypt a desktop export with its password
pub fn decrypt_import_payload(password: &str, payload: &EncryptedPayload) -> Result<WalletImportData> {
    if payload.version != PAYLOAD_VERSION {
        return Err(ImportError::UnsupportedVersion(payload.version).into());
    }

    let salt = decode_hex("salt", &payload.salt)?;
    let iv = decode_hex("iv", &payload.iv)?;
    let ciphertext = decode_hex("encrypted", &payload.encrypted)?;
    if iv.len() != IV_LENGTH {
        return Err(ImportError::InvalidPayload(format!(
            "iv must be {} bytes, got {}",
            IV_LENGTH,
            iv.len()
        ))
        .into());
    }

    let key = derive_key(password, &salt);
    let cipher = ExportCipher::new_from_slice(&key[..])
        .map_err(|e| ImportError::InvalidPayload(e.to_string()))?;
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::<U64>::from_slice(&iv), ciphertext.as_slice())
            .map_err(|_| ImportError::Decryption)?,
    );

    serde_json::from_slice(&plaintext)
        .map_err(|e| ImportError::InvalidPayload(e.to_string()).into())
}

/// Encrypt wallet data into the desktop export format
pub fn seal_export_payload(password: &str, data: &WalletImportData) -> Result<EncryptedPayload> {
    let mut salt = [0u8; SALT_LENGTH];
    let mut iv = [0u8; IV_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    rand::thread_rng().fill_bytes(&mut iv);

    let plaintext = Zeroizing::new(serde_json::to_vec(data)?);
    let key = derive_key(password, &salt);
    let cipher = ExportCipher::new_from_slice(&key[..])
        .map_err(|e| ImportError::InvalidPayload(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::<U64>::from_slice(&iv), plaintext.as_slice())
        .map_err(|_| ImportError::Decryption)?;

    Ok(EncryptedPayload {
        version: PAYLOAD_VERSION,
        salt: hex::encode(salt),
        iv: hex::encode(iv),
        encrypted: hex::encode(ciphertext),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn sample() -> WalletImportData {
        WalletImportData {
            mnemonic: Zeroizing::new("abandon abandon about".to_string()),
            addresses: vec![ImportedAddress {
                index: 4,
                label: Some("savings".to_string()),
                color: Some("#FF5D51".to_string()),
                is_default: true,
            }],
            contacts: Vec::new(),
        }
    }

    #[test]
    fn test_seal_then_decrypt() {
        let payload = seal_export_payload("correct horse", &sample()).unwrap();
        let json = payload.to_json().unwrap();
        let parsed = EncryptedPayload::from_json(&json).unwrap();
        let data = decrypt_import_payload("correct horse", &parsed).unwrap();
        assert_eq!(data.mnemonic.as_str(), "abandon abandon about");
        assert_eq!(data.addresses, sample().addresses);
    }

    #[test]
    fn test_wrong_password() {
        let payload = seal_export_payload("correct horse", &sample()).unwrap();
        let err = decrypt_import_payload("battery staple", &payload).unwrap_err();
        assert!(matches!(err, Error::Import(ImportError::Decryption)));
    }

    #[test]
    fn test_unsupported_version() {
        let mut payload = seal_export_payload("pw", &sample()).unwrap();
        payload.version = 2;
        assert!(matches!(
            decrypt_import_payload("pw", &payload),
            Err(Error::Import(ImportError::UnsupportedVersion(2)))
        ));
    }

    #[test]
    fn test_malformed_payload() {
        assert!(matches!(
            EncryptedPayload::from_json("{\"version\":1}"),
            Err(Error::Import(ImportError::InvalidPayload(_)))
        ));
        let mut payload = seal_export_payload("pw", &sample()).unwrap();
        payload.iv = "abcd".to_string();
        assert!(matches!(
            decrypt_import_payload("pw", &payload),
            Err(Error::Import(ImportError::InvalidPayload(_)))
        ));
    }

    #[test]
    fn test_plaintext_field_names_match_desktop() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json["addresses"][0].get("isDefault").is_some());
        assert!(json.get("mnemonic").is_some());
    }
}
