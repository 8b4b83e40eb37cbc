//! PIN and biometric gated credential storage
//!
//! Layout inside [`SecureStorage`]:
//!
//! - `wallet-index`: JSON list of [`StoredWallet`]
//! - `active-wallet`: id of the wallet opened on launch
//! - `wallet-{id}-pin`: mnemonic sealed under an Argon2id PIN key
//! - `wallet-{id}-biometric`: mnemonic sealed under a random key that the
//!   platform authenticator releases after a biometric prompt

use crate::models::{PinSealedSeed, StoredWallet};
use crate::secure_storage::SecureStorage;
use crate::security::{derive_key_bytes, generate_salt, KdfParams, MasterKey, PinVerifier};
use crate::{Error, Result};
use alph_core::{AuthType, MnemonicPhrase, WalletId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

const WALLET_INDEX_KEY: &str = "wallet-index";
const ACTIVE_WALLET_KEY: &str = "active-wallet";

/// Maximum wallet name length
pub const MAX_WALLET_NAME_LENGTH: usize = 100;

fn pin_key(wallet_id: &str) -> String {
    format!("wallet-{}-pin", wallet_id)
}

fn biometric_key(wallet_id: &str) -> String {
    format!("wallet-{}-biometric", wallet_id)
}

fn mnemonic_from_plaintext(plaintext: &[u8]) -> Result<MnemonicPhrase> {
    let phrase = std::str::from_utf8(plaintext)
        .map_err(|_| Error::Encryption("stored mnemonic is not UTF-8".to_string()))?;
    MnemonicPhrase::parse(phrase)
        .map_err(|_| Error::Encryption("stored mnemonic failed validation".to_string()))
}

fn seal_with_pin(phrase: &str, pin: &str, kdf: &KdfParams) -> Result<PinSealedSeed> {
    let salt = generate_salt();
    let key = derive_key_bytes(pin, &salt, kdf)?;
    let verifier = PinVerifier::hash(pin, kdf)?;
    let blob = key.encrypt(phrase.as_bytes())?;
    Ok(PinSealedSeed {
        salt: hex::encode(salt),
        verifier: verifier.hash_string().to_string(),
        blob: hex::encode(blob),
        kdf: *kdf,
    })
}

/// Run Argon2id work off the async executor
async fn run_kdf<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Security(format!("KDF task failed: {}", e)))?
}

/// Credential store over platform secure storage
pub struct SecureCredentialStore {
    storage: Arc<dyn SecureStorage>,
    kdf: KdfParams,
    index_lock: Mutex<()>,
}

impl SecureCredentialStore {
    /// Create a store
    pub fn new(storage: Arc<dyn SecureStorage>, kdf: KdfParams) -> Self {
        Self {
            storage,
            kdf,
            index_lock: Mutex::new(()),
        }
    }

    /// All stored wallets
    pub async fn list_wallets(&self) -> Result<Vec<StoredWallet>> {
        match self.storage.load(WALLET_INDEX_KEY).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save_index(&self, wallets: &[StoredWallet]) -> Result<()> {
        let bytes = serde_json::to_vec(wallets)?;
        self.storage.store(WALLET_INDEX_KEY, bytes).await
    }

    /// Stored wallet by id
    pub async fn wallet(&self, wallet_id: &str) -> Result<StoredWallet> {
        self.list_wallets()
            .await?
            .into_iter()
            .find(|w| w.id == wallet_id)
            .ok_or_else(|| Error::NotFound(format!("wallet {}", wallet_id)))
    }

    /// The wallet opened on launch, if any
    pub async fn active_wallet(&self) -> Result<Option<StoredWallet>> {
        let Some(bytes) = self.storage.load(ACTIVE_WALLET_KEY).await? else {
            return Ok(None);
        };
        let active_id = String::from_utf8_lossy(&bytes).to_string();
        let wallet = self
            .list_wallets()
            .await?
            .into_iter()
            .find(|w| w.id == active_id);
        if wallet.is_none() {
            warn!(
                event = "active_wallet_dangling",
                wallet_id = %active_id,
                "Active wallet pointer references a missing wallet"
            );
        }
        Ok(wallet)
    }

    /// Point launch at `wallet_id`
    pub async fn set_active_wallet(&self, wallet_id: &str) -> Result<()> {
        self.wallet(wallet_id).await?;
        self.storage
            .store(ACTIVE_WALLET_KEY, wallet_id.as_bytes().to_vec())
            .await
    }

    /// Seal a new wallet under `pin`, add it to the index and make it active
    pub async fn store_new_wallet(
        &self,
        name: &str,
        mnemonic: &MnemonicPhrase,
        pin: &str,
    ) -> Result<StoredWallet> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Wallet name cannot be empty".to_string()));
        }
        if name.chars().count() > MAX_WALLET_NAME_LENGTH {
            return Err(Error::Validation(format!(
                "Wallet name exceeds maximum length of {} characters",
                MAX_WALLET_NAME_LENGTH
            )));
        }

        let _guard = self.index_lock.lock().await;
        let mut wallets = self.list_wallets().await?;
        if wallets.iter().any(|w| w.name == name) {
            return Err(Error::Validation(format!("Wallet name {} already in use", name)));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let seed_ref = pin_key(&id);
        let wallet = StoredWallet {
            id,
            name: name.to_string(),
            auth_type: AuthType::Pin,
            encrypted_seed_ref: seed_ref.clone(),
            created_at: chrono::Utc::now().timestamp(),
        };

        let phrase = Zeroizing::new(mnemonic.as_str().to_string());
        let pin_owned = Zeroizing::new(pin.to_string());
        let kdf = self.kdf;
        let sealed = run_kdf(move || seal_with_pin(&phrase, &pin_owned, &kdf)).await?;
        self.storage
            .store(&seed_ref, serde_json::to_vec(&sealed)?)
            .await?;

        let previous = wallets.clone();
        wallets.push(wallet.clone());
        if let Err(e) = self.save_index(&wallets).await {
            self.storage.delete(&seed_ref).await?;
            return Err(e);
        }
        if let Err(e) = self
            .storage
            .store(ACTIVE_WALLET_KEY, wallet.id.as_bytes().to_vec())
            .await
        {
            warn!(
                event = "wallet_store_rolled_back",
                wallet_id = %wallet.id,
                error = %e,
                "Could not set active wallet; removing new wallet"
            );
            self.save_index(&previous).await?;
            self.storage.delete(&seed_ref).await?;
            return Err(e);
        }

        info!(
            event = "wallet_stored",
            wallet_id = %wallet.id,
            wallet_name = %wallet.name,
            "Stored new wallet"
        );
        Ok(wallet)
    }

    /// Decrypt the mnemonic with the wallet PIN
    ///
    /// A PIN that fails the verifier yields [`Error::InvalidCredential`]; a
    /// blob that fails to decrypt after the PIN verified yields
    /// [`Error::Encryption`].
    pub async fn unlock_with_pin(&self, wallet_id: &str, pin: &str) -> Result<MnemonicPhrase> {
        let bytes = self
            .storage
            .load(&pin_key(wallet_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("credentials for wallet {}", wallet_id)))?;
        let sealed: PinSealedSeed = serde_json::from_slice(&bytes)?;

        let pin = Zeroizing::new(pin.to_string());
        let opened = run_kdf(move || {
            let verifier = PinVerifier::from_hash(sealed.verifier);
            if !verifier.verify(&pin)? {
                return Err(Error::InvalidCredential);
            }
            let salt = hex::decode(&sealed.salt).map_err(|e| Error::Encryption(e.to_string()))?;
            let blob = hex::decode(&sealed.blob).map_err(|e| Error::Encryption(e.to_string()))?;
            let key = derive_key_bytes(&pin, &salt, &sealed.kdf)?;
            key.decrypt(&blob)
        })
        .await;
        match opened {
            Ok(plaintext) => mnemonic_from_plaintext(&plaintext),
            Err(Error::InvalidCredential) => {
                debug!(event = "pin_rejected", wallet_id = %wallet_id, "PIN did not match");
                Err(Error::InvalidCredential)
            }
            Err(e) => Err(e),
        }
    }

    /// Seal the mnemonic under a fresh random key for biometric unlock
    ///
    /// Returns the key; the caller hands it to the platform authenticator.
    pub async fn enable_biometrics(
        &self,
        wallet_id: &str,
        mnemonic: &MnemonicPhrase,
    ) -> Result<Zeroizing<Vec<u8>>> {
        self.wallet(wallet_id).await?;
        let key = MasterKey::generate();
        let blob = key.encrypt(mnemonic.as_str().as_bytes())?;
        self.storage.store(&biometric_key(wallet_id), blob).await?;
        self.set_auth_type(wallet_id, AuthType::Biometrics).await?;
        info!(event = "biometrics_enabled", wallet_id = %wallet_id, "Enabled biometric unlock");
        Ok(Zeroizing::new(key.as_bytes().to_vec()))
    }

    /// Decrypt the mnemonic with the secret released by the authenticator
    pub async fn unlock_with_biometric_secret(
        &self,
        wallet_id: &str,
        secret: &[u8],
    ) -> Result<MnemonicPhrase> {
        let blob = self
            .storage
            .load(&biometric_key(wallet_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("biometric credentials for {}", wallet_id)))?;
        let key = MasterKey::from_bytes(secret)?;
        let plaintext = key.decrypt(&blob)?;
        mnemonic_from_plaintext(&plaintext)
    }

    /// Delete the biometric blob and revert to PIN unlock
    pub async fn disable_biometrics(&self, wallet_id: &str) -> Result<()> {
        self.storage.delete(&biometric_key(wallet_id)).await?;
        self.set_auth_type(wallet_id, AuthType::Pin).await?;
        info!(event = "biometrics_disabled", wallet_id = %wallet_id, "Disabled biometric unlock");
        Ok(())
    }

    async fn set_auth_type(&self, wallet_id: &str, auth_type: AuthType) -> Result<()> {
        let _guard = self.index_lock.lock().await;
        let mut wallets = self.list_wallets().await?;
        let wallet = wallets
            .iter_mut()
            .find(|w| w.id == wallet_id)
            .ok_or_else(|| Error::NotFound(format!("wallet {}", wallet_id)))?;
        if wallet.auth_type == auth_type {
            return Ok(());
        }
        wallet.auth_type = auth_type;
        self.save_index(&wallets).await
    }

    /// Remove every credential of a wallet
    ///
    /// Clears the active pointer when it referenced the deleted wallet.
    pub async fn delete_wallet(&self, wallet_id: &str) -> Result<()> {
        let _guard = self.index_lock.lock().await;
        let mut wallets = self.list_wallets().await?;
        let before = wallets.len();
        wallets.retain(|w| w.id != wallet_id);
        if wallets.len() == before {
            return Err(Error::NotFound(format!("wallet {}", wallet_id)));
        }

        self.save_index(&wallets).await?;
        self.storage.delete(&pin_key(wallet_id)).await?;
        self.storage.delete(&biometric_key(wallet_id)).await?;

        if let Some(active) = self.storage.load(ACTIVE_WALLET_KEY).await? {
            if active == wallet_id.as_bytes() {
                self.storage.delete(ACTIVE_WALLET_KEY).await?;
            }
        }

        info!(
            event = "wallet_deleted",
            wallet_id = %wallet_id,
            remaining = wallets.len(),
            "Deleted wallet credentials"
        );
        Ok(())
    }

    /// Id of every stored wallet
    pub async fn wallet_ids(&self) -> Result<Vec<WalletId>> {
        Ok(self.list_wallets().await?.into_iter().map(|w| w.id).collect())
    }
}
