//! Address set, contacts and sync operations on the loaded wallet
//!
//! Address mutations work on a copy of the set, persist the changed
//! settings, and only then replace the in-memory set.

use crate::error::{Error, Result};
use crate::session::SessionStateMachine;
use alph_core::{
    random_label_color, Address, AddressSettings, Contact, WalletAddresses, WalletId,
};
use alph_sync::{SyncOutcome, Transaction};
use tracing::{debug, info};

/// Parameters of [`SessionStateMachine::generate_address`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewAddressRequest {
    /// Target group
    pub group: Option<u8>,
    /// Label
    pub label: Option<String>,
    /// Color; random from the palette when unset
    pub color: Option<String>,
    /// Make the new address main
    pub is_main: bool,
}

impl SessionStateMachine {
    /// Addresses of the loaded wallet in index order
    pub fn addresses(&self) -> Vec<Address> {
        let inner = self.inner.lock();
        inner
            .current
            .as_ref()
            .and_then(|loaded| loaded.addresses.as_ref())
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Main address of the loaded wallet
    pub fn main_address(&self) -> Option<Address> {
        let inner = self.inner.lock();
        inner
            .current
            .as_ref()
            .and_then(|loaded| loaded.addresses.as_ref())
            .and_then(|set| set.main().cloned())
    }

    fn address_snapshot(&self) -> Result<(WalletId, WalletAddresses)> {
        let inner = self.inner.lock();
        let loaded = inner.current.as_ref().ok_or(Error::NoActiveWallet)?;
        let set = loaded.addresses.clone().ok_or(Error::NotUnlocked)?;
        Ok((loaded.wallet.id.clone(), set))
    }

    fn commit_addresses(&self, wallet_id: &str, set: WalletAddresses) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.current.as_mut() {
            Some(loaded) if loaded.wallet.id == wallet_id => {
                loaded.addresses = Some(set);
                Ok(())
            }
            _ => Err(Error::NoActiveWallet),
        }
    }

    /// Derive, persist and sync a new address
    ///
    /// Indexes already in the wallet are skipped. With a group the first
    /// free index landing in it is used.
    pub async fn generate_address(&self, request: NewAddressRequest) -> Result<Address> {
        let address = {
            let _ops = self.address_ops.lock().await;
            let (wallet_id, mnemonic, epoch) = self.unlocked_session()?;
            let (_, mut set) = self.address_snapshot()?;
            let seed = mnemonic.to_master_seed("")?;
            drop(mnemonic);
            let data = self
                .deriver
                .derive(&seed, request.group, None, &set.indexes())?;
            drop(seed);
            self.ensure_epoch(epoch)?;

            let settings = AddressSettings {
                label: request.label,
                color: request.color.unwrap_or_else(random_label_color),
                is_default: request.is_main,
            };
            let hash = data.hash.clone();
            let changed = set.insert(Address::from_data(data, settings))?;
            self.metadata.persist_address_settings(&wallet_id, &changed)?;
            let address = set
                .get(&hash)
                .cloned()
                .ok_or_else(|| alph_core::Error::AddressNotFound(hash.clone()))?;
            self.commit_addresses(&wallet_id, set)?;

            info!(
                event = "address_generated",
                wallet_id = %wallet_id,
                index = address.index,
                group = address.group,
                is_main = address.is_main(),
                "Generated address"
            );
            address
        };

        self.sync_logged(std::slice::from_ref(&address.hash)).await;
        Ok(address)
    }

    /// Make `hash` the main address
    pub async fn set_main_address(&self, hash: &str) -> Result<()> {
        let _ops = self.address_ops.lock().await;
        let (wallet_id, mut set) = self.address_snapshot()?;
        let changed = set.set_main(hash)?;
        if changed.is_empty() {
            return Ok(());
        }
        self.metadata.persist_address_settings(&wallet_id, &changed)?;
        self.commit_addresses(&wallet_id, set)?;
        info!(event = "main_address_changed", wallet_id = %wallet_id, address = %hash, "Changed main address");
        Ok(())
    }

    /// Replace the settings of `hash`
    pub async fn update_address_settings(
        &self,
        hash: &str,
        settings: AddressSettings,
    ) -> Result<Address> {
        let _ops = self.address_ops.lock().await;
        let (wallet_id, mut set) = self.address_snapshot()?;
        let changed = set.update_settings(hash, settings)?;
        self.metadata.persist_address_settings(&wallet_id, &changed)?;
        let address = set
            .get(hash)
            .cloned()
            .ok_or_else(|| alph_core::Error::AddressNotFound(hash.to_string()))?;
        self.commit_addresses(&wallet_id, set)?;
        debug!(event = "address_settings_updated", wallet_id = %wallet_id, address = %hash, "Updated address settings");
        Ok(address)
    }

    /// Remove an address, promoting the lowest remaining index when it was main
    pub async fn remove_address(&self, hash: &str) -> Result<Address> {
        let _ops = self.address_ops.lock().await;
        let (wallet_id, mut set) = self.address_snapshot()?;
        let (removed, promoted) = set.remove(hash)?;
        self.metadata
            .remove_address(&wallet_id, removed.index, promoted.as_ref())?;
        self.commit_addresses(&wallet_id, set)?;
        self.sync.forget(hash);
        info!(
            event = "address_removed",
            wallet_id = %wallet_id,
            index = removed.index,
            promoted = ?promoted.as_ref().map(|a| a.index),
            "Removed address"
        );
        Ok(removed)
    }

    /// Restore addresses with on-chain activity
    ///
    /// Returns the addresses added to the wallet. Locking while the walk
    /// is waiting on the explorer abandons it with [`Error::NotUnlocked`].
    pub async fn discover_addresses(&self) -> Result<Vec<Address>> {
        let added = {
            let _ops = self.address_ops.lock().await;
            let (wallet_id, mnemonic, epoch) = self.unlocked_session()?;
            let seed = mnemonic.to_master_seed("")?;
            drop(mnemonic);
            let provider = self.sync.provider();
            let keep_going = || self.ensure_epoch(epoch).is_ok();
            let found = match alph_sync::discover_addresses(
                &self.deriver,
                &seed,
                provider.as_ref(),
                self.config.sync.discovery_gap_limit,
                &keep_going,
            )
            .await
            {
                Ok(found) => found,
                Err(alph_sync::Error::Cancelled) => {
                    info!(event = "discovery_abandoned", wallet_id = %wallet_id, "Session locked during discovery");
                    return Err(Error::NotUnlocked);
                }
                Err(e) => return Err(e.into()),
            };
            drop(seed);
            self.ensure_epoch(epoch)?;

            let (_, mut set) = self.address_snapshot()?;
            let known = set.indexes();
            let mut added = Vec::new();
            let mut changed = Vec::new();
            for data in found.into_iter().filter(|d| !known.contains(&d.index)) {
                let hash = data.hash.clone();
                changed.extend(set.insert(Address::from_data(data, AddressSettings::new(None, false)))?);
                if let Some(address) = set.get(&hash) {
                    added.push(address.clone());
                }
            }
            if !changed.is_empty() {
                self.metadata.persist_address_settings(&wallet_id, &changed)?;
                self.commit_addresses(&wallet_id, set)?;
            }
            info!(
                event = "addresses_discovered",
                wallet_id = %wallet_id,
                added = added.len(),
                "Address discovery finished"
            );
            added
        };

        let hashes: Vec<String> = added.iter().map(|a| a.hash.clone()).collect();
        self.sync_logged(&hashes).await;
        Ok(added)
    }

    /// Refresh balances and history of every address
    pub async fn sync_addresses(&self) -> Result<SyncOutcome> {
        let hashes = self.current_hashes();
        if hashes.is_empty() {
            return Err(Error::NoActiveWallet);
        }
        Ok(self.sync.sync_balances_and_history(&hashes).await?)
    }

    /// Load the next older history page of every address
    pub async fn load_more_history(&self) -> Result<SyncOutcome> {
        let hashes = self.current_hashes();
        if hashes.is_empty() {
            return Err(Error::NoActiveWallet);
        }
        Ok(self.sync.sync_next_page(&hashes).await?)
    }

    /// Record a transaction sent from one of the wallet's addresses
    ///
    /// Returns `false` when it was already known.
    pub fn add_pending_transaction(&self, address: &str, tx: Transaction) -> Result<bool> {
        if !self.current_hashes().iter().any(|h| h == address) {
            return Err(alph_core::Error::AddressNotFound(address.to_string()).into());
        }
        Ok(self.sync.add_pending_transaction(address, tx))
    }

    /// Contacts of the loaded wallet
    pub fn contacts(&self) -> Result<Vec<Contact>> {
        let wallet_id = self.loaded_wallet_id()?;
        Ok(self.metadata.contacts(&wallet_id)?.into_vec())
    }

    /// Contacts whose name or address contains `term`, ignoring case
    pub fn filter_contacts(&self, term: &str) -> Result<Vec<Contact>> {
        let wallet_id = self.loaded_wallet_id()?;
        let contacts = self.metadata.contacts(&wallet_id)?;
        Ok(contacts.filter(term).into_iter().cloned().collect())
    }

    /// Add a contact with a fresh id
    pub fn add_contact(&self, name: &str, address: &str) -> Result<Contact> {
        let wallet_id = self.loaded_wallet_id()?;
        let contact = Contact::new(name.trim(), address.trim());
        self.metadata.add_contact(&wallet_id, contact.clone())?;
        Ok(contact)
    }

    /// Replace a contact with the same id
    pub fn update_contact(&self, contact: Contact) -> Result<()> {
        let wallet_id = self.loaded_wallet_id()?;
        Ok(self.metadata.update_contact(&wallet_id, contact)?)
    }

    /// Delete a contact
    pub fn delete_contact(&self, contact_id: &str) -> Result<Contact> {
        let wallet_id = self.loaded_wallet_id()?;
        Ok(self.metadata.delete_contact(&wallet_id, contact_id)?)
    }

    /// Merge contacts by id
    pub fn import_contacts(&self, contacts: Vec<Contact>) -> Result<usize> {
        let wallet_id = self.loaded_wallet_id()?;
        Ok(self.metadata.import_contacts(&wallet_id, contacts)?)
    }
}
