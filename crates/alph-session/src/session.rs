//! Session state machine
//!
//! `Locked -> Unlocking -> {Unlocked | AuthenticationFailed} -> Locked`.
//!
//! The mnemonic lives inside the loaded [`Wallet`] only while the state is
//! `Unlocked`. Every transition into or out of `Unlocked` happens under the
//! `inner` lock together with installing or purging the mnemonic, so the two
//! never disagree.

use crate::auth::{Authenticator, BiometricAvailability};
use crate::config::SessionConfig;
use crate::error::{AuthError, Error, Result};
use crate::state::{SessionEvent, SessionState, UnlockOutcome};
use alph_core::{
    Address, AddressDeriver, AddressSettings, AuthType, KeyDerivation, MnemonicPhrase, Wallet,
    WalletAddresses, WalletId,
};
use alph_storage::{
    MetadataBackend, SecureCredentialStore, SecureStorage, StoredWallet, WalletMetadataStore,
};
use alph_sync::{AddressSyncState, ChainDataProvider, SyncCoordinator, SyncEvent};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

type UnlockResult = std::result::Result<UnlockOutcome, AuthError>;

/// Host-provided collaborators
#[derive(Clone)]
pub struct Collaborators {
    /// Keychain / Keystore
    pub secure_storage: Arc<dyn SecureStorage>,
    /// Metadata documents
    pub metadata_backend: Arc<dyn MetadataBackend>,
    /// Blockchain data source
    pub chain: Arc<dyn ChainDataProvider>,
    /// PIN pad and biometric prompt
    pub authenticator: Arc<dyn Authenticator>,
    /// HD key derivation
    pub key_derivation: Arc<dyn KeyDerivation>,
}

pub(crate) struct LoadedWallet {
    pub(crate) wallet: Wallet,
    /// `None` until the address set is loaded for this session
    pub(crate) addresses: Option<WalletAddresses>,
}

#[derive(Default)]
pub(crate) struct Inner {
    pub(crate) current: Option<LoadedWallet>,
    pub(crate) camera_active: bool,
}

/// Wallet session
pub struct SessionStateMachine {
    pub(crate) credentials: SecureCredentialStore,
    pub(crate) metadata: WalletMetadataStore,
    pub(crate) deriver: AddressDeriver,
    pub(crate) sync: SyncCoordinator,
    pub(crate) authenticator: Arc<dyn Authenticator>,
    pub(crate) config: SessionConfig,
    pub(crate) inner: Mutex<Inner>,
    /// Serializes address set mutations
    pub(crate) address_ops: tokio::sync::Mutex<()>,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    unlock_gate: tokio::sync::Mutex<()>,
    unlock_generation: AtomicU64,
    last_unlock: Mutex<Option<UnlockResult>>,
    lock_epoch: AtomicU64,
}

impl SessionStateMachine {
    /// Create a locked session
    pub fn new(collaborators: Collaborators, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Locked);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            credentials: SecureCredentialStore::new(collaborators.secure_storage, config.kdf),
            metadata: WalletMetadataStore::new(collaborators.metadata_backend),
            deriver: AddressDeriver::new(collaborators.key_derivation, config.deriver),
            sync: SyncCoordinator::new(collaborators.chain, config.sync),
            authenticator: collaborators.authenticator,
            config,
            inner: Mutex::new(Inner::default()),
            address_ops: tokio::sync::Mutex::new(()),
            state,
            events,
            unlock_gate: tokio::sync::Mutex::new(()),
            unlock_generation: AtomicU64::new(0),
            last_unlock: Mutex::new(None),
            lock_epoch: AtomicU64::new(0),
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Watch state changes
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Subscribe to session events
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Subscribe to sync events
    pub fn subscribe_sync_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.sync.subscribe()
    }

    /// Configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether the mnemonic is in memory
    pub fn is_unlocked(&self) -> bool {
        self.state().is_unlocked()
    }

    /// Loaded wallet, without its mnemonic
    pub fn current_wallet(&self) -> Option<Wallet> {
        self.inner.lock().current.as_ref().map(|loaded| {
            let mut wallet = loaded.wallet.clone();
            wallet.purge_mnemonic();
            wallet
        })
    }

    /// Run `f` with the mnemonic; `None` while locked
    pub fn with_mnemonic<R>(&self, f: impl FnOnce(&MnemonicPhrase) -> R) -> Option<R> {
        let inner = self.inner.lock();
        inner.current.as_ref()?.wallet.mnemonic.as_ref().map(f)
    }

    /// Cached sync state of one address
    pub fn address_sync_state(&self, address: &str) -> Option<AddressSyncState> {
        self.sync.state(address)
    }

    pub(crate) fn publish(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub(crate) fn set_state(&self, next: SessionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next.clone();
            true
        });
        if changed {
            info!(event = "session_state", state = %next, "Session state changed");
            self.publish(SessionEvent::StateChanged(next));
        }
    }

    fn unlocked_wallet_id(&self) -> Option<WalletId> {
        let inner = self.inner.lock();
        inner
            .current
            .as_ref()
            .filter(|loaded| loaded.wallet.mnemonic.is_some())
            .map(|loaded| loaded.wallet.id.clone())
    }

    /// Unlock the active wallet
    ///
    /// Only one attempt runs at a time. Callers arriving while an attempt is
    /// in progress wait for it and receive its result instead of prompting
    /// again.
    pub async fn unlock(&self) -> UnlockResult {
        let observed = self.unlock_generation.load(Ordering::SeqCst);
        let _gate = self.unlock_gate.lock().await;

        if self.unlock_generation.load(Ordering::SeqCst) != observed {
            let last = self.last_unlock.lock().clone();
            if let Some(result) = last {
                debug!(event = "unlock_joined", "Joined concurrent unlock attempt");
                return result;
            }
        }
        if let Some(wallet_id) = self.unlocked_wallet_id() {
            return Ok(UnlockOutcome::Unlocked { wallet_id });
        }

        let result = self.run_unlock().await;
        *self.last_unlock.lock() = Some(result.clone());
        self.unlock_generation.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn run_unlock(&self) -> UnlockResult {
        let epoch = self.lock_epoch.load(Ordering::SeqCst);

        let mut stored = match self.credentials.active_wallet().await {
            Ok(Some(stored)) => stored,
            Ok(None) => return self.no_stored_wallet().await,
            Err(e) => return Err(self.fail(None, AuthError::from_storage(e))),
        };

        self.set_state(SessionState::Unlocking);
        info!(
            event = "unlock_started",
            wallet_id = %stored.id,
            auth_type = %stored.auth_type,
            "Unlocking wallet"
        );

        let mnemonic = match self.authenticate(&mut stored).await {
            Ok(mnemonic) => mnemonic,
            Err(AuthError::Cancelled) => {
                info!(event = "unlock_cancelled", wallet_id = %stored.id, "Unlock cancelled");
                self.set_state(SessionState::Locked);
                return Err(AuthError::Cancelled);
            }
            Err(e) => return Err(self.fail(Some(&stored.id), e)),
        };

        let (addresses, initialized) = match self.loaded_addresses(&stored.id) {
            Some(addresses) => (addresses, false),
            None => match self.load_addresses(&stored.id, &mnemonic) {
                Ok(addresses) => (addresses, true),
                Err(e) => {
                    return Err(self.fail(Some(&stored.id), AuthError::Storage(e.to_string())));
                }
            },
        };
        let count = addresses.len();

        let committed = {
            let mut inner = self.inner.lock();
            if self.lock_epoch.load(Ordering::SeqCst) != epoch {
                false
            } else {
                let mut wallet = stored.to_wallet();
                wallet.mnemonic = Some(mnemonic);
                inner.current = Some(LoadedWallet {
                    wallet,
                    addresses: Some(addresses),
                });
                self.set_state(SessionState::Unlocked);
                true
            }
        };
        if !committed {
            info!(
                event = "unlock_discarded",
                wallet_id = %stored.id,
                "Session locked while unlocking; discarding credentials"
            );
            return Err(AuthError::Cancelled);
        }

        if initialized {
            self.publish(SessionEvent::AddressesInitialized {
                wallet_id: stored.id.clone(),
                count,
            });
        }
        info!(event = "unlocked", wallet_id = %stored.id, addresses = count, "Wallet unlocked");

        if self.config.sync_on_unlock {
            self.sync_current_logged().await;
        }
        Ok(UnlockOutcome::Unlocked {
            wallet_id: stored.id,
        })
    }

    async fn no_stored_wallet(&self) -> UnlockResult {
        let other_wallets_exist = match self.credentials.list_wallets().await {
            Ok(wallets) => !wallets.is_empty(),
            Err(e) => return Err(self.fail(None, AuthError::from_storage(e))),
        };
        info!(
            event = "no_stored_wallet",
            other_wallets_exist,
            "No active wallet to unlock"
        );
        self.set_state(SessionState::Locked);
        self.publish(SessionEvent::NoStoredWallet {
            other_wallets_exist,
        });
        Ok(UnlockOutcome::NoStoredWallet {
            other_wallets_exist,
        })
    }

    fn fail(&self, wallet_id: Option<&str>, err: AuthError) -> AuthError {
        error!(
            event = "authentication_failed",
            wallet_id = wallet_id.unwrap_or("-"),
            error = %err,
            "Authentication failed"
        );
        self.set_state(SessionState::AuthenticationFailed(err.clone()));
        err
    }

    /// Prompt until the mnemonic is released or the retry policy gives up
    async fn authenticate(&self, stored: &mut StoredWallet) -> std::result::Result<MnemonicPhrase, AuthError> {
        let availability = self.authenticator.biometric_availability().await;
        if stored.auth_type == AuthType::Biometrics && !availability.is_available() {
            self.fall_back_to_pin(stored, availability).await?;
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = match stored.auth_type {
                AuthType::Pin => self.try_pin(&stored.id).await,
                AuthType::Biometrics => self.try_biometric(&stored.id).await,
            };
            let err = match result {
                Ok(mnemonic) => return Ok(mnemonic),
                Err(err) => err,
            };

            match &err {
                AuthError::Unavailable if stored.auth_type == AuthType::Biometrics => {
                    self.fall_back_to_pin(stored, BiometricAvailability::Revoked)
                        .await?;
                    continue;
                }
                AuthError::Cancelled => {
                    self.publish(SessionEvent::AuthenticationPromptCancelled);
                }
                _ => {}
            }

            if !self.config.retry.should_retry(attempt, &err) {
                return Err(err);
            }
            debug!(
                event = "unlock_reprompt",
                wallet_id = %stored.id,
                attempt,
                reason = %err,
                "Prompting again"
            );
        }
    }

    async fn try_pin(&self, wallet_id: &WalletId) -> std::result::Result<MnemonicPhrase, AuthError> {
        let secret = self.authenticator.prompt_pin(wallet_id).await?;
        let pin = secret.as_pin()?;
        self.credentials
            .unlock_with_pin(wallet_id, pin)
            .await
            .map_err(AuthError::from_storage)
    }

    async fn try_biometric(&self, wallet_id: &WalletId) -> std::result::Result<MnemonicPhrase, AuthError> {
        let secret = self.authenticator.prompt_biometric(wallet_id).await?;
        match self
            .credentials
            .unlock_with_biometric_secret(wallet_id, secret.as_bytes())
            .await
        {
            Ok(mnemonic) => Ok(mnemonic),
            // The PIN blob stays authoritative when the biometric one is unusable
            Err(e) if e.is_corruption()
                || matches!(e, alph_storage::Error::NotFound(_) | alph_storage::Error::Security(_)) =>
            {
                warn!(
                    event = "biometric_blob_unusable",
                    wallet_id = %wallet_id,
                    error = %e,
                    "Biometric credentials unusable"
                );
                Err(AuthError::Unavailable)
            }
            Err(e) => Err(AuthError::from_storage(e)),
        }
    }

    async fn fall_back_to_pin(
        &self,
        stored: &mut StoredWallet,
        availability: BiometricAvailability,
    ) -> std::result::Result<(), AuthError> {
        warn!(
            event = "biometrics_unavailable",
            wallet_id = %stored.id,
            availability = ?availability,
            "Biometrics unavailable; falling back to PIN"
        );
        self.credentials
            .disable_biometrics(&stored.id)
            .await
            .map_err(AuthError::from_storage)?;
        if let Err(e) = self.authenticator.remove_biometric_secret(&stored.id).await {
            debug!(wallet_id = %stored.id, error = %e, "Could not remove biometric secret");
        }
        stored.auth_type = AuthType::Pin;
        self.set_loaded_auth_type(&stored.id, AuthType::Pin);
        self.publish(SessionEvent::BiometricsDisabled {
            wallet_id: stored.id.clone(),
        });
        Ok(())
    }

    pub(crate) fn set_loaded_auth_type(&self, wallet_id: &str, auth_type: AuthType) {
        let mut inner = self.inner.lock();
        if let Some(loaded) = inner.current.as_mut().filter(|l| l.wallet.id == wallet_id) {
            loaded.wallet.auth_type = auth_type;
        }
    }

    /// Purge the mnemonic and enter `Locked`
    ///
    /// Safe to call in any state and any number of times.
    pub fn lock(&self) {
        let purged = {
            let mut inner = self.inner.lock();
            self.lock_epoch.fetch_add(1, Ordering::SeqCst);
            let purged = inner
                .current
                .as_mut()
                .map(|loaded| loaded.wallet.mnemonic.take().is_some())
                .unwrap_or(false);
            self.set_state(SessionState::Locked);
            purged
        };
        if purged {
            info!(event = "session_locked", "Session locked; mnemonic purged");
            self.publish(SessionEvent::Locked);
        }
    }

    /// Host resumed the app
    ///
    /// Starts an unlock when no mnemonic is in memory.
    pub async fn on_foreground_resume(&self) -> UnlockResult {
        if let Some(wallet_id) = self.unlocked_wallet_id() {
            return Ok(UnlockOutcome::Unlocked { wallet_id });
        }
        debug!(event = "foreground_resume", "Resumed while locked");
        self.unlock().await
    }

    /// Host moved the app to the background
    ///
    /// Locks unless a camera or capture screen is open. Returns whether the
    /// session locked.
    pub fn on_background(&self) -> bool {
        let camera_active = self.inner.lock().camera_active;
        if camera_active {
            debug!(event = "background_kept_unlocked", "Camera active; staying unlocked");
            return false;
        }
        if !self.is_unlocked() {
            return false;
        }
        self.lock();
        true
    }

    /// Camera or capture screen opened or closed
    pub fn set_camera_active(&self, active: bool) {
        self.inner.lock().camera_active = active;
    }

    /// Process is terminating
    pub fn on_terminate(&self) {
        self.lock();
        self.sync.clear();
    }

    /// Forget the loaded wallet after locking
    pub(crate) fn unload_wallet(&self) {
        self.lock();
        self.inner.lock().current = None;
        self.sync.clear();
    }

    pub(crate) fn unlocked_context(&self) -> Result<(WalletId, MnemonicPhrase)> {
        let (wallet_id, mnemonic, _) = self.unlocked_session()?;
        Ok((wallet_id, mnemonic))
    }

    /// Wallet id, mnemonic and the lock epoch they were read under
    pub(crate) fn unlocked_session(&self) -> Result<(WalletId, MnemonicPhrase, u64)> {
        let inner = self.inner.lock();
        let loaded = inner.current.as_ref().ok_or(Error::NoActiveWallet)?;
        let mnemonic = loaded.wallet.mnemonic.clone().ok_or(Error::NotUnlocked)?;
        let epoch = self.lock_epoch.load(Ordering::SeqCst);
        Ok((loaded.wallet.id.clone(), mnemonic, epoch))
    }

    /// Fails when the session locked since `epoch` was read
    pub(crate) fn ensure_epoch(&self, epoch: u64) -> Result<()> {
        if self.lock_epoch.load(Ordering::SeqCst) != epoch {
            return Err(Error::NotUnlocked);
        }
        Ok(())
    }

    pub(crate) fn loaded_wallet_id(&self) -> Result<WalletId> {
        self.inner
            .lock()
            .current
            .as_ref()
            .map(|loaded| loaded.wallet.id.clone())
            .ok_or(Error::NoActiveWallet)
    }

    fn loaded_addresses(&self, wallet_id: &str) -> Option<WalletAddresses> {
        let inner = self.inner.lock();
        inner
            .current
            .as_ref()
            .filter(|loaded| loaded.wallet.id == wallet_id)
            .and_then(|loaded| loaded.addresses.clone())
    }

    /// Install a freshly stored wallet as unlocked
    pub(crate) fn install_unlocked(
        &self,
        stored: &StoredWallet,
        mnemonic: MnemonicPhrase,
        addresses: WalletAddresses,
    ) {
        self.unload_wallet();
        let count = addresses.len();
        {
            let mut inner = self.inner.lock();
            let mut wallet = stored.to_wallet();
            wallet.mnemonic = Some(mnemonic);
            inner.current = Some(LoadedWallet {
                wallet,
                addresses: Some(addresses),
            });
            self.set_state(SessionState::Unlocked);
        }
        self.publish(SessionEvent::AddressesInitialized {
            wallet_id: stored.id.clone(),
            count,
        });
    }

    /// Address set from stored settings, or a new main address at index 0
    fn load_addresses(&self, wallet_id: &str, mnemonic: &MnemonicPhrase) -> Result<WalletAddresses> {
        let seed = mnemonic.to_master_seed("")?;
        let stored = self
            .metadata
            .get_metadata(wallet_id)?
            .map(|m| m.addresses)
            .unwrap_or_default();

        if stored.is_empty() {
            let data = self.deriver.derive_at(&seed, 0)?;
            let mut set = WalletAddresses::new();
            let changed = set.insert(Address::from_data(data, AddressSettings::new(None, true)))?;
            self.metadata.persist_address_settings(wallet_id, &changed)?;
            return Ok(set);
        }

        let mut addresses = Vec::with_capacity(stored.len());
        for entry in &stored {
            let data = self.deriver.derive_at(&seed, entry.index)?;
            addresses.push(Address::from_data(data, entry.settings()));
        }
        let set = WalletAddresses::from_addresses(addresses)?;

        let repaired: Vec<Address> = set
            .iter()
            .filter(|address| {
                stored
                    .iter()
                    .any(|entry| entry.index == address.index && entry.is_default != address.is_main())
            })
            .cloned()
            .collect();
        if !repaired.is_empty() {
            warn!(
                event = "main_address_repaired",
                wallet_id = %wallet_id,
                "Stored settings had no main address; promoted the lowest index"
            );
            self.metadata.persist_address_settings(wallet_id, &repaired)?;
        }
        Ok(set)
    }

    pub(crate) async fn sync_current_logged(&self) {
        let hashes = self.current_hashes();
        self.sync_logged(&hashes).await;
    }

    pub(crate) async fn sync_logged(&self, hashes: &[String]) {
        if hashes.is_empty() {
            return;
        }
        if let Err(e) = self.sync.sync_balances_and_history(hashes).await {
            warn!(event = "background_sync_failed", error = %e, "Sync after wallet change failed");
        }
    }

    pub(crate) fn current_hashes(&self) -> Vec<String> {
        let inner = self.inner.lock();
        inner
            .current
            .as_ref()
            .and_then(|loaded| loaded.addresses.as_ref())
            .map(|set| set.hashes())
            .unwrap_or_default()
    }
}

impl Drop for SessionStateMachine {
    fn drop(&mut self) {
        if let Some(loaded) = self.inner.get_mut().current.as_mut() {
            loaded.wallet.purge_mnemonic();
        }
    }
}
