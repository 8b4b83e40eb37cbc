//! Wallet lifecycle: create, import, switch, delete and biometrics

use crate::error::{AuthError, Error, Result};
use crate::session::SessionStateMachine;
use alph_core::{
    decrypt_import_payload, generate_mnemonic, random_label_color, Address, AddressSettings,
    AuthType, Contact, ContactList, EncryptedPayload, MnemonicPhrase, Wallet, WalletAddresses,
};
use alph_storage::{validate_color, StoredWallet};
use tracing::{debug, info, warn};

impl SessionStateMachine {
    /// Create and unlock a new wallet
    ///
    /// Generates a 24-word mnemonic when none is given. Index 0 becomes the
    /// main address.
    pub async fn create_wallet(
        &self,
        name: &str,
        pin: &str,
        mnemonic: Option<MnemonicPhrase>,
    ) -> Result<Wallet> {
        let mnemonic = match mnemonic {
            Some(mnemonic) => mnemonic,
            None => generate_mnemonic(None)?,
        };
        let seed = mnemonic.to_master_seed("")?;
        let main = self.deriver.derive_at(&seed, 0)?;
        let addresses =
            WalletAddresses::from_addresses(vec![Address::from_data(main, AddressSettings::new(None, true))])?;

        let carry_biometrics = self.biometrics_preferred().await;
        let stored = self.credentials.store_new_wallet(name, &mnemonic, pin).await?;
        self.open_new_wallet(stored, mnemonic, addresses, Vec::new(), carry_biometrics)
            .await
    }

    /// Import a desktop wallet export and unlock it
    ///
    /// Every listed address is re-derived at its index with its settings and
    /// the contacts are merged into the new wallet. A wrong password fails
    /// with `ImportError::Decryption` before anything is stored.
    pub async fn import_wallet_from_payload(
        &self,
        name: &str,
        pin: &str,
        password: &str,
        payload: &EncryptedPayload,
    ) -> Result<Wallet> {
        let data = decrypt_import_payload(password, payload)?;
        let mnemonic = MnemonicPhrase::parse(&data.mnemonic)?;
        let seed = mnemonic.to_master_seed("")?;

        let mut addresses = Vec::with_capacity(data.addresses.len().max(1));
        for entry in &data.addresses {
            let derived = self.deriver.derive_at(&seed, entry.index)?;
            let color = entry
                .color
                .clone()
                .filter(|c| validate_color(c).is_ok())
                .unwrap_or_else(random_label_color);
            addresses.push(Address::from_data(
                derived,
                AddressSettings {
                    label: entry.label.clone(),
                    color,
                    is_default: entry.is_default,
                },
            ));
        }
        if addresses.is_empty() {
            let derived = self.deriver.derive_at(&seed, 0)?;
            addresses.push(Address::from_data(derived, AddressSettings::new(None, true)));
        }
        let addresses = WalletAddresses::from_addresses(addresses)?;

        // Reject bad contacts before the wallet exists
        ContactList::new().merge(data.contacts.clone())?;

        let carry_biometrics = self.biometrics_preferred().await;
        let stored = self.credentials.store_new_wallet(name, &mnemonic, pin).await?;
        let wallet = self
            .open_new_wallet(stored, mnemonic, addresses, data.contacts.clone(), carry_biometrics)
            .await?;

        info!(
            event = "wallet_imported",
            wallet_id = %wallet.id,
            addresses = data.addresses.len(),
            contacts = data.contacts.len(),
            "Imported wallet"
        );
        Ok(wallet)
    }

    /// Whether the unlocked wallet uses biometrics and they still work
    async fn biometrics_preferred(&self) -> bool {
        let uses_biometrics = self.is_unlocked()
            && self
                .current_wallet()
                .map(|w| w.auth_type == AuthType::Biometrics)
                .unwrap_or(false);
        uses_biometrics && self.authenticator.biometric_availability().await.is_available()
    }

    async fn open_new_wallet(
        &self,
        stored: StoredWallet,
        mnemonic: MnemonicPhrase,
        addresses: WalletAddresses,
        contacts: Vec<Contact>,
        carry_biometrics: bool,
    ) -> Result<Wallet> {
        let all: Vec<Address> = addresses.iter().cloned().collect();
        if let Err(e) = self.metadata.initialize_wallet(&stored.id, &all, contacts) {
            if let Err(cleanup) = self.credentials.delete_wallet(&stored.id).await {
                warn!(
                    event = "wallet_rollback_failed",
                    wallet_id = %stored.id,
                    error = %cleanup,
                    "Could not remove wallet after failed metadata write"
                );
            }
            return Err(e.into());
        }

        self.install_unlocked(&stored, mnemonic, addresses);
        info!(
            event = "wallet_created",
            wallet_id = %stored.id,
            addresses = all.len(),
            "Wallet ready"
        );

        if carry_biometrics {
            if let Err(e) = self.enable_biometrics().await {
                warn!(
                    event = "biometrics_carry_over_failed",
                    wallet_id = %stored.id,
                    error = %e,
                    "Could not enable biometrics on new wallet"
                );
            }
        }
        if self.config.sync_on_unlock {
            self.sync_current_logged().await;
        }
        self.current_wallet().ok_or(Error::NoActiveWallet)
    }

    /// Turn on biometric unlock for the unlocked wallet
    pub async fn enable_biometrics(&self) -> Result<()> {
        let (wallet_id, mnemonic) = self.unlocked_context()?;
        let availability = self.authenticator.biometric_availability().await;
        if !availability.is_available() {
            debug!(wallet_id = %wallet_id, availability = ?availability, "Biometrics not available");
            return Err(AuthError::Unavailable.into());
        }

        let secret = self.credentials.enable_biometrics(&wallet_id, &mnemonic).await?;
        if let Err(e) = self
            .authenticator
            .register_biometric_secret(&wallet_id, &secret)
            .await
        {
            warn!(
                event = "biometric_registration_failed",
                wallet_id = %wallet_id,
                error = %e,
                "Platform rejected biometric secret"
            );
            self.credentials.disable_biometrics(&wallet_id).await?;
            return Err(e.into());
        }
        self.set_loaded_auth_type(&wallet_id, AuthType::Biometrics);
        Ok(())
    }

    /// Turn off biometric unlock for a wallet
    pub async fn disable_biometrics(&self, wallet_id: &str) -> Result<()> {
        self.credentials.disable_biometrics(wallet_id).await?;
        if let Err(e) = self
            .authenticator
            .remove_biometric_secret(&wallet_id.to_string())
            .await
        {
            debug!(wallet_id = %wallet_id, error = %e, "Could not remove biometric secret");
        }
        self.set_loaded_auth_type(wallet_id, AuthType::Pin);
        Ok(())
    }

    /// Stored wallets
    pub async fn wallets(&self) -> Result<Vec<Wallet>> {
        Ok(self
            .credentials
            .list_wallets()
            .await?
            .iter()
            .map(StoredWallet::to_wallet)
            .collect())
    }

    /// Make `wallet_id` active and lock
    ///
    /// The next unlock loads the new wallet's address set.
    pub async fn switch_wallet(&self, wallet_id: &str) -> Result<()> {
        self.credentials.set_active_wallet(wallet_id).await?;
        self.unload_wallet();
        info!(event = "wallet_switched", wallet_id = %wallet_id, "Switched active wallet");
        Ok(())
    }

    /// Delete a wallet's credentials and metadata
    ///
    /// Deleting the loaded wallet locks the session.
    pub async fn delete_wallet(&self, wallet_id: &str) -> Result<()> {
        self.credentials.delete_wallet(wallet_id).await?;
        self.metadata.delete_wallet(wallet_id)?;
        if let Err(e) = self
            .authenticator
            .remove_biometric_secret(&wallet_id.to_string())
            .await
        {
            debug!(wallet_id = %wallet_id, error = %e, "Could not remove biometric secret");
        }

        let was_loaded = self
            .loaded_wallet_id()
            .map(|id| id == wallet_id)
            .unwrap_or(false);
        if was_loaded {
            self.unload_wallet();
        }
        info!(event = "wallet_removed", wallet_id = %wallet_id, was_loaded, "Deleted wallet");
        Ok(())
    }
}
