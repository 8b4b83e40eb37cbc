//! Per-wallet durable settings
//!
//! Every mutation loads the wallet's document, applies the change in memory,
//! validates the result and replaces the whole document. A failed validation
//! or write leaves the stored document as it was. Mutations on one wallet are
//! serialized; different wallets do not wait on each other.

use crate::models::{AddressMetadata, WalletMetadata};
use crate::{Error, Result};
use alph_core::{Address, Contact, ContactList};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Maximum address label length
pub const MAX_LABEL_LENGTH: usize = 100;

/// Document storage for [`WalletMetadataStore`]
pub trait MetadataBackend: Send + Sync {
    /// Load a wallet's document
    fn load(&self, wallet_id: &str) -> Result<Option<WalletMetadata>>;

    /// Replace a wallet's document atomically
    fn save(&self, metadata: &WalletMetadata) -> Result<()>;

    /// Remove a wallet's document
    fn delete(&self, wallet_id: &str) -> Result<()>;
}

/// Metadata documents held in memory
#[derive(Default)]
pub struct MemoryMetadataBackend {
    documents: RwLock<HashMap<String, WalletMetadata>>,
    fail_writes: AtomicBool,
}

impl MemoryMetadataBackend {
    /// Empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save fail with [`Error::WriteFailed`]
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl MetadataBackend for MemoryMetadataBackend {
    fn load(&self, wallet_id: &str) -> Result<Option<WalletMetadata>> {
        Ok(self.documents.read().get(wallet_id).cloned())
    }

    fn save(&self, metadata: &WalletMetadata) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::WriteFailed(format!("metadata for {}", metadata.id)));
        }
        self.documents
            .write()
            .insert(metadata.id.clone(), metadata.clone());
        Ok(())
    }

    fn delete(&self, wallet_id: &str) -> Result<()> {
        self.documents.write().remove(wallet_id);
        Ok(())
    }
}

/// Check that `color` is `#RRGGBB`
pub fn validate_color(color: &str) -> Result<()> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(Error::Validation(format!("Invalid color {}", color)));
    }
    Ok(())
}

fn validate_document(metadata: &WalletMetadata) -> Result<()> {
    for address in &metadata.addresses {
        if let Some(label) = &address.label {
            if label.chars().count() > MAX_LABEL_LENGTH {
                return Err(Error::Validation(format!(
                    "Label exceeds maximum length of {} characters",
                    MAX_LABEL_LENGTH
                )));
            }
        }
        validate_color(&address.color)?;
    }
    let mains = metadata.addresses.iter().filter(|a| a.is_default).count();
    if mains > 1 {
        return Err(Error::Validation(format!(
            "{} main addresses in wallet {}",
            mains, metadata.id
        )));
    }
    Ok(())
}

/// Wallet metadata store
pub struct WalletMetadataStore {
    backend: Arc<dyn MetadataBackend>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl WalletMetadataStore {
    /// Create a store over `backend`
    pub fn new(backend: Arc<dyn MetadataBackend>) -> Self {
        Self {
            backend,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn wallet_lock(&self, wallet_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(wallet_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn update<T>(
        &self,
        wallet_id: &str,
        apply: impl FnOnce(&mut WalletMetadata) -> Result<T>,
    ) -> Result<T> {
        let lock = self.wallet_lock(wallet_id);
        let _guard = lock.lock();

        let mut metadata = self
            .backend
            .load(wallet_id)?
            .unwrap_or_else(|| WalletMetadata::new(wallet_id));
        let value = apply(&mut metadata)?;
        metadata.addresses.sort_by_key(|a| a.index);
        validate_document(&metadata)?;
        self.backend.save(&metadata)?;
        Ok(value)
    }

    /// Metadata of a wallet, `None` if nothing was ever written
    pub fn get_metadata(&self, wallet_id: &str) -> Result<Option<WalletMetadata>> {
        self.backend.load(wallet_id)
    }

    /// Upsert the settings of `addresses` by index
    pub fn persist_address_settings(&self, wallet_id: &str, addresses: &[Address]) -> Result<()> {
        self.update(wallet_id, |metadata| {
            for address in addresses {
                let entry = AddressMetadata::from(address);
                match metadata.addresses.iter_mut().find(|a| a.index == entry.index) {
                    Some(existing) => *existing = entry,
                    None => metadata.addresses.push(entry),
                }
            }
            Ok(())
        })?;
        debug!(
            event = "address_settings_persisted",
            wallet_id = %wallet_id,
            count = addresses.len(),
            "Persisted address settings"
        );
        Ok(())
    }

    /// Write a new wallet's addresses and contacts in one document update
    pub fn initialize_wallet(
        &self,
        wallet_id: &str,
        addresses: &[Address],
        contacts: Vec<Contact>,
    ) -> Result<()> {
        let contact_count = contacts.len();
        self.update(wallet_id, |metadata| {
            for address in addresses {
                let entry = AddressMetadata::from(address);
                match metadata.addresses.iter_mut().find(|a| a.index == entry.index) {
                    Some(existing) => *existing = entry,
                    None => metadata.addresses.push(entry),
                }
            }
            let mut list = ContactList::from(std::mem::take(&mut metadata.contacts));
            list.merge(contacts)?;
            metadata.contacts = list.into_vec();
            Ok(())
        })?;
        info!(
            event = "wallet_metadata_initialized",
            wallet_id = %wallet_id,
            addresses = addresses.len(),
            contacts = contact_count,
            "Initialized wallet metadata"
        );
        Ok(())
    }

    /// Remove the settings of the address at `index`
    ///
    /// `promoted` is written in the same document update, so removing the
    /// main address never leaves a wallet without one on disk.
    pub fn remove_address(
        &self,
        wallet_id: &str,
        index: u32,
        promoted: Option<&Address>,
    ) -> Result<()> {
        self.update(wallet_id, |metadata| {
            let before = metadata.addresses.len();
            metadata.addresses.retain(|a| a.index != index);
            if metadata.addresses.len() == before {
                return Err(Error::NotFound(format!("address #{}", index)));
            }
            if let Some(address) = promoted {
                let entry = AddressMetadata::from(address);
                match metadata.addresses.iter_mut().find(|a| a.index == entry.index) {
                    Some(existing) => *existing = entry,
                    None => metadata.addresses.push(entry),
                }
            }
            Ok(())
        })
    }

    /// Contacts of a wallet
    pub fn contacts(&self, wallet_id: &str) -> Result<ContactList> {
        Ok(self
            .backend
            .load(wallet_id)?
            .map(|m| ContactList::from(m.contacts))
            .unwrap_or_default())
    }

    /// Merge contacts by id
    pub fn import_contacts(&self, wallet_id: &str, contacts: Vec<Contact>) -> Result<usize> {
        let count = self.update(wallet_id, |metadata| {
            let mut list = ContactList::from(std::mem::take(&mut metadata.contacts));
            let merged = list.merge(contacts)?;
            metadata.contacts = list.into_vec();
            Ok(merged)
        })?;
        info!(
            event = "contacts_imported",
            wallet_id = %wallet_id,
            count,
            "Imported contacts"
        );
        Ok(count)
    }

    /// Add a contact
    pub fn add_contact(&self, wallet_id: &str, contact: Contact) -> Result<()> {
        self.update(wallet_id, |metadata| {
            let mut list = ContactList::from(std::mem::take(&mut metadata.contacts));
            list.add(contact)?;
            metadata.contacts = list.into_vec();
            Ok(())
        })
    }

    /// Replace a contact with the same id
    pub fn update_contact(&self, wallet_id: &str, contact: Contact) -> Result<()> {
        self.update(wallet_id, |metadata| {
            let mut list = ContactList::from(std::mem::take(&mut metadata.contacts));
            list.update(contact)?;
            metadata.contacts = list.into_vec();
            Ok(())
        })
    }

    /// Delete a contact
    pub fn delete_contact(&self, wallet_id: &str, contact_id: &str) -> Result<Contact> {
        self.update(wallet_id, |metadata| {
            let mut list = ContactList::from(std::mem::take(&mut metadata.contacts));
            let removed = list.delete(contact_id)?;
            metadata.contacts = list.into_vec();
            Ok(removed)
        })
    }

    /// Remove every setting of a wallet
    pub fn delete_wallet(&self, wallet_id: &str) -> Result<()> {
        let lock = self.wallet_lock(wallet_id);
        {
            let _guard = lock.lock();
            self.backend.delete(wallet_id)?;
        }
        self.locks.lock().remove(wallet_id);
        info!(event = "wallet_metadata_deleted", wallet_id = %wallet_id, "Deleted wallet metadata");
        Ok(())
    }
}
