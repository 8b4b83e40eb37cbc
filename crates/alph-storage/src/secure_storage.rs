//! Platform secure storage boundary
//!
//! Keychain / Keystore backed key-value storage is provided by the host. Blobs
//! handed to it are already encrypted by [`crate::SecureCredentialStore`].

use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// Platform secure key-value storage
#[async_trait]
pub trait SecureStorage: Send + Sync {
    /// Store a blob, replacing any previous value
    async fn store(&self, key: &str, blob: Vec<u8>) -> Result<()>;

    /// Load a blob
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a blob; deleting a missing key succeeds
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory secure storage for tests and tooling
#[derive(Default)]
pub struct MemorySecureStorage {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
    failing_keys: RwLock<HashSet<String>>,
}

impl MemorySecureStorage {
    /// Create empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `store` fail with [`Error::WriteFailed`]
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make `store` fail for `key` only
    pub fn set_fail_key(&self, key: &str, fail: bool) {
        let mut keys = self.failing_keys.write();
        if fail {
            keys.insert(key.to_string());
        } else {
            keys.remove(key);
        }
    }

    /// Overwrite a stored blob in place
    pub fn corrupt(&self, key: &str, blob: Vec<u8>) {
        self.entries.write().insert(key.to_string(), blob);
    }

    /// Whether a key is present
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }
}

#[async_trait]
impl SecureStorage for MemorySecureStorage {
    async fn store(&self, key: &str, blob: Vec<u8>) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) || self.failing_keys.read().contains(key) {
            return Err(Error::WriteFailed(format!("secure storage rejected {}", key)));
        }
        self.entries.write().insert(key.to_string(), blob);
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}
