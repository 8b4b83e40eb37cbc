//! Session state machine tests with scripted collaborators

use alph_core::{
    seal_export_payload, AddressDeriver, AddressSettings, AuthType, Bip44Derivation, Contact,
    DeriverConfig, ImportedAddress, MnemonicPhrase, WalletId, WalletImportData,
};
use alph_params::Network;
use alph_session::{
    AuthError, Authenticator, BiometricAvailability, Collaborators, Error, NewAddressRequest,
    RetryPolicy, Secret, SessionConfig, SessionEvent, SessionState, SessionStateMachine,
    UnlockOutcome,
};
use alph_storage::{
    KdfParams, MemoryMetadataBackend, MemorySecureStorage, MetadataBackend, WalletMetadata,
};
use alph_sync::{BalanceInfo, ChainDataProvider, SyncError, Transaction, TransactionPage};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use zeroize::Zeroizing;

const PHRASE: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
const PIN: &str = "1234";

// ============================================================================
// Scripted collaborators
// ============================================================================

struct ScriptedAuthenticator {
    pin: Mutex<String>,
    pin_script: Mutex<VecDeque<Result<Secret, AuthError>>>,
    availability: Mutex<BiometricAvailability>,
    biometric_secrets: Mutex<HashMap<WalletId, Vec<u8>>>,
    pin_prompts: AtomicUsize,
    biometric_prompts: AtomicUsize,
    hold_pin: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl ScriptedAuthenticator {
    fn new() -> Self {
        Self {
            pin: Mutex::new(PIN.to_string()),
            pin_script: Mutex::new(VecDeque::new()),
            availability: Mutex::new(BiometricAvailability::Unsupported),
            biometric_secrets: Mutex::new(HashMap::new()),
            pin_prompts: AtomicUsize::new(0),
            biometric_prompts: AtomicUsize::new(0),
            hold_pin: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    fn script_pin(&self, responses: Vec<Result<Secret, AuthError>>) {
        self.pin_script.lock().extend(responses);
    }

    fn set_pin(&self, pin: &str) {
        *self.pin.lock() = pin.to_string();
    }

    fn set_availability(&self, availability: BiometricAvailability) {
        *self.availability.lock() = availability;
    }

    fn pin_prompts(&self) -> usize {
        self.pin_prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for ScriptedAuthenticator {
    async fn biometric_availability(&self) -> BiometricAvailability {
        *self.availability.lock()
    }

    async fn prompt_pin(&self, _wallet_id: &WalletId) -> Result<Secret, AuthError> {
        self.pin_prompts.fetch_add(1, Ordering::SeqCst);
        if self.hold_pin.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        let scripted = self.pin_script.lock().pop_front();
        match scripted {
            Some(response) => response,
            None => Ok(Secret::from_pin(&self.pin.lock())),
        }
    }

    async fn prompt_biometric(&self, wallet_id: &WalletId) -> Result<Secret, AuthError> {
        self.biometric_prompts.fetch_add(1, Ordering::SeqCst);
        if !self.availability.lock().is_available() {
            return Err(AuthError::Unavailable);
        }
        self.biometric_secrets
            .lock()
            .get(wallet_id)
            .cloned()
            .map(Secret::new)
            .ok_or(AuthError::Unavailable)
    }

    async fn register_biometric_secret(
        &self,
        wallet_id: &WalletId,
        secret: &[u8],
    ) -> Result<(), AuthError> {
        self.biometric_secrets
            .lock()
            .insert(wallet_id.clone(), secret.to_vec());
        Ok(())
    }

    async fn remove_biometric_secret(&self, wallet_id: &WalletId) -> Result<(), AuthError> {
        self.biometric_secrets.lock().remove(wallet_id);
        Ok(())
    }
}

#[derive(Default)]
struct StaticChain {
    balance_calls: AtomicUsize,
}

#[async_trait]
impl ChainDataProvider for StaticChain {
    async fn fetch_balance(&self, _address: &str) -> Result<BalanceInfo, SyncError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        Ok(BalanceInfo {
            amount: 1_000,
            as_of_block: 42,
        })
    }

    async fn fetch_transaction_page(
        &self,
        _address: &str,
        _cursor: Option<&str>,
    ) -> Result<TransactionPage, SyncError> {
        Ok(TransactionPage::default())
    }
}

struct Harness {
    session: Arc<SessionStateMachine>,
    auth: Arc<ScriptedAuthenticator>,
    storage: Arc<MemorySecureStorage>,
    metadata: Arc<MemoryMetadataBackend>,
    chain: Arc<StaticChain>,
}

fn test_config() -> SessionConfig {
    SessionConfig {
        kdf: KdfParams::low_cost(),
        retry: RetryPolicy::new(3),
        sync_on_unlock: false,
        ..SessionConfig::default()
    }
}

fn harness_with(config: SessionConfig) -> Harness {
    let auth = Arc::new(ScriptedAuthenticator::new());
    let storage = Arc::new(MemorySecureStorage::new());
    let metadata = Arc::new(MemoryMetadataBackend::new());
    let chain = Arc::new(StaticChain::default());
    let session = SessionStateMachine::new(
        Collaborators {
            secure_storage: storage.clone(),
            metadata_backend: metadata.clone(),
            chain: chain.clone(),
            authenticator: auth.clone(),
            key_derivation: Arc::new(Bip44Derivation::new(&Network::mainnet()).unwrap()),
        },
        config,
    );
    Harness {
        session: Arc::new(session),
        auth,
        storage,
        metadata,
        chain,
    }
}

/// Session over a caller-supplied metadata backend and chain
fn session_on(
    metadata: Arc<dyn MetadataBackend>,
    chain: Arc<dyn ChainDataProvider>,
) -> (Arc<SessionStateMachine>, Arc<ScriptedAuthenticator>) {
    let auth = Arc::new(ScriptedAuthenticator::new());
    let session = SessionStateMachine::new(
        Collaborators {
            secure_storage: Arc::new(MemorySecureStorage::new()),
            metadata_backend: metadata,
            chain,
            authenticator: auth.clone(),
            key_derivation: Arc::new(Bip44Derivation::new(&Network::mainnet()).unwrap()),
        },
        test_config(),
    );
    (Arc::new(session), auth)
}

fn harness() -> Harness {
    harness_with(test_config())
}

fn phrase() -> MnemonicPhrase {
    MnemonicPhrase::parse(PHRASE).unwrap()
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn states(events: &[SessionEvent]) -> Vec<SessionState> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged(state) => Some(state.clone()),
            _ => None,
        })
        .collect()
}

async fn unlocked_wallet(h: &Harness) -> WalletId {
    h.session
        .create_wallet("Main", PIN, Some(phrase()))
        .await
        .unwrap()
        .id
}

// ============================================================================
// Unlock
// ============================================================================

#[tokio::test]
async fn test_create_wallet_enters_unlocked_with_main_address() {
    let h = harness();
    let wallet_id = unlocked_wallet(&h).await;

    assert_eq!(h.session.state(), SessionState::Unlocked);
    let addresses = h.session.addresses();
    assert_eq!(addresses.len(), 1);
    assert_eq!(addresses[0].index, 0);
    assert!(addresses[0].is_main());

    let stored = h.metadata.load(&wallet_id).unwrap().unwrap();
    assert_eq!(stored.addresses.len(), 1);
    assert!(stored.addresses[0].is_default);
}

#[tokio::test]
async fn test_correct_pin_unlocks() {
    let h = harness();
    unlocked_wallet(&h).await;
    h.session.lock();
    assert_eq!(h.session.state(), SessionState::Locked);
    assert!(h.session.with_mnemonic(|_| ()).is_none());

    let mut events = h.session.subscribe_events();
    let outcome = h.session.unlock().await.unwrap();
    assert!(matches!(outcome, UnlockOutcome::Unlocked { .. }));

    let events = drain(&mut events);
    assert_eq!(
        states(&events),
        vec![SessionState::Unlocking, SessionState::Unlocked]
    );
    // Address set stays loaded across lock and unlock
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::AddressesInitialized { .. })));
    assert_eq!(
        h.session.with_mnemonic(|m| m.as_str().to_string()),
        Some(PHRASE.to_string())
    );
}

#[tokio::test]
async fn test_cancel_then_reprompt() {
    let h = harness();
    unlocked_wallet(&h).await;
    h.session.lock();

    h.auth.script_pin(vec![Err(AuthError::Cancelled)]);
    let mut events = h.session.subscribe_events();
    h.session.unlock().await.unwrap();

    assert_eq!(h.auth.pin_prompts(), 2);
    assert!(h.session.is_unlocked());
    assert!(drain(&mut events)
        .iter()
        .any(|e| *e == SessionEvent::AuthenticationPromptCancelled));
}

#[tokio::test]
async fn test_cancelled_unlock_stays_locked() {
    let h = harness();
    unlocked_wallet(&h).await;
    h.session.lock();

    h.auth.script_pin(vec![
        Err(AuthError::Cancelled),
        Err(AuthError::Cancelled),
        Err(AuthError::Cancelled),
    ]);
    let mut events = h.session.subscribe_events();
    let err = h.session.unlock().await.unwrap_err();

    assert_eq!(err, AuthError::Cancelled);
    assert_eq!(h.auth.pin_prompts(), 3);
    assert_eq!(h.session.state(), SessionState::Locked);
    let seen = states(&drain(&mut events));
    assert!(!seen
        .iter()
        .any(|s| matches!(s, SessionState::AuthenticationFailed(_))));
    assert!(h.session.with_mnemonic(|_| ()).is_none());
}

#[tokio::test]
async fn test_wrong_pin_fails_after_policy() {
    let h = harness();
    unlocked_wallet(&h).await;
    h.session.lock();

    h.auth.set_pin("0000");
    let err = h.session.unlock().await.unwrap_err();
    assert_eq!(err, AuthError::InvalidCredential);
    assert_eq!(h.auth.pin_prompts(), 3);
    assert_eq!(
        h.session.state(),
        SessionState::AuthenticationFailed(AuthError::InvalidCredential)
    );

    h.auth.set_pin(PIN);
    h.session.unlock().await.unwrap();
    assert!(h.session.is_unlocked());
}

#[tokio::test]
async fn test_corrupt_credentials_fail_without_retry() {
    let h = harness();
    let wallet_id = unlocked_wallet(&h).await;
    h.session.lock();

    h.storage
        .corrupt(&format!("wallet-{}-pin", wallet_id), b"not a sealed seed".to_vec());
    let err = h.session.unlock().await.unwrap_err();

    assert!(matches!(err, AuthError::CredentialCorrupt(_)));
    assert_eq!(h.auth.pin_prompts(), 1);
    assert!(matches!(
        h.session.state(),
        SessionState::AuthenticationFailed(AuthError::CredentialCorrupt(_))
    ));
}

#[tokio::test]
async fn test_no_stored_wallet_routes_to_onboarding() {
    let h = harness();
    let mut events = h.session.subscribe_events();
    let outcome = h.session.unlock().await.unwrap();
    assert_eq!(
        outcome,
        UnlockOutcome::NoStoredWallet {
            other_wallets_exist: false
        }
    );
    assert_eq!(h.session.state(), SessionState::Locked);
    assert_eq!(h.auth.pin_prompts(), 0);
    assert!(drain(&mut events).contains(&SessionEvent::NoStoredWallet {
        other_wallets_exist: false
    }));
}

#[tokio::test]
async fn test_concurrent_unlocks_share_one_prompt() {
    let h = harness();
    unlocked_wallet(&h).await;
    h.session.lock();
    h.auth.hold_pin.store(true, Ordering::SeqCst);

    let first = {
        let session = h.session.clone();
        tokio::spawn(async move { session.unlock().await })
    };
    h.auth.entered.notified().await;
    let second = {
        let session = h.session.clone();
        tokio::spawn(async move { session.unlock().await })
    };
    tokio::task::yield_now().await;
    h.auth.release.notify_one();

    let a = first.await.unwrap().unwrap();
    let b = second.await.unwrap().unwrap();
    assert_eq!(a, b);
    assert_eq!(h.auth.pin_prompts(), 1);
}

#[tokio::test]
async fn test_lock_during_prompt_discards_unlock() {
    let h = harness();
    unlocked_wallet(&h).await;
    h.session.lock();
    h.auth.hold_pin.store(true, Ordering::SeqCst);

    let pending = {
        let session = h.session.clone();
        tokio::spawn(async move { session.unlock().await })
    };
    h.auth.entered.notified().await;
    h.session.lock();
    h.auth.release.notify_one();

    assert_eq!(pending.await.unwrap(), Err(AuthError::Cancelled));
    assert_eq!(h.session.state(), SessionState::Locked);
    assert!(h.session.with_mnemonic(|_| ()).is_none());
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_background_locks_unless_camera_active() {
    let h = harness();
    unlocked_wallet(&h).await;

    h.session.set_camera_active(true);
    assert!(!h.session.on_background());
    assert!(h.session.is_unlocked());

    h.session.set_camera_active(false);
    assert!(h.session.on_background());
    assert_eq!(h.session.state(), SessionState::Locked);
    assert!(h.session.with_mnemonic(|_| ()).is_none());
    assert!(!h.session.on_background());
}

#[tokio::test]
async fn test_foreground_resume_unlocks_when_locked() {
    let h = harness();
    unlocked_wallet(&h).await;

    h.session.on_foreground_resume().await.unwrap();
    assert_eq!(h.auth.pin_prompts(), 0);

    h.session.on_background();
    h.session.on_foreground_resume().await.unwrap();
    assert_eq!(h.auth.pin_prompts(), 1);
    assert!(h.session.is_unlocked());
}

#[tokio::test]
async fn test_lock_is_idempotent_and_terminate_purges() {
    let h = harness();
    unlocked_wallet(&h).await;
    let mut events = h.session.subscribe_events();
    h.session.lock();
    h.session.lock();
    let locked = drain(&mut events)
        .into_iter()
        .filter(|e| *e == SessionEvent::Locked)
        .count();
    assert_eq!(locked, 1);

    h.session.unlock().await.unwrap();
    h.session.on_terminate();
    assert!(h.session.with_mnemonic(|_| ()).is_none());
    assert_eq!(h.session.state(), SessionState::Locked);
}

#[tokio::test]
async fn test_state_watch_tracks_transitions() {
    let h = harness();
    let mut watch = h.session.subscribe_state();
    unlocked_wallet(&h).await;
    assert!(watch.has_changed().unwrap());
    assert_eq!(*watch.borrow_and_update(), SessionState::Unlocked);
    h.session.lock();
    assert_eq!(*watch.borrow_and_update(), SessionState::Locked);
}

// ============================================================================
// Biometrics
// ============================================================================

#[tokio::test]
async fn test_biometric_unlock() {
    let h = harness();
    h.auth.set_availability(BiometricAvailability::Available);
    let wallet_id = unlocked_wallet(&h).await;
    h.session.enable_biometrics().await.unwrap();
    assert_eq!(
        h.session.current_wallet().unwrap().auth_type,
        AuthType::Biometrics
    );

    h.session.lock();
    h.session.unlock().await.unwrap();
    assert_eq!(h.auth.pin_prompts(), 0);
    assert_eq!(h.auth.biometric_prompts.load(Ordering::SeqCst), 1);
    assert!(h.storage.contains(&format!("wallet-{}-biometric", wallet_id)));
}

#[tokio::test]
async fn test_revoked_biometrics_fall_back_to_pin() {
    let h = harness();
    h.auth.set_availability(BiometricAvailability::Available);
    let wallet_id = unlocked_wallet(&h).await;
    h.session.enable_biometrics().await.unwrap();
    h.session.lock();

    h.auth.set_availability(BiometricAvailability::Revoked);
    let mut events = h.session.subscribe_events();
    h.session.unlock().await.unwrap();

    assert_eq!(h.auth.pin_prompts(), 1);
    assert_eq!(h.auth.biometric_prompts.load(Ordering::SeqCst), 0);
    assert!(drain(&mut events).contains(&SessionEvent::BiometricsDisabled {
        wallet_id: wallet_id.clone()
    }));
    assert!(!h.storage.contains(&format!("wallet-{}-biometric", wallet_id)));
    let stored = h.session.wallets().await.unwrap();
    assert_eq!(stored[0].auth_type, AuthType::Pin);
}

#[tokio::test]
async fn test_enable_biometrics_requires_capability() {
    let h = harness();
    unlocked_wallet(&h).await;
    let err = h.session.enable_biometrics().await.unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::Unavailable)));

    h.session.lock();
    h.auth.set_availability(BiometricAvailability::Available);
    assert!(matches!(
        h.session.enable_biometrics().await,
        Err(Error::NotUnlocked)
    ));
}

#[tokio::test]
async fn test_new_wallet_inherits_biometrics() {
    let h = harness();
    h.auth.set_availability(BiometricAvailability::Available);
    unlocked_wallet(&h).await;
    h.session.enable_biometrics().await.unwrap();

    let second = h.session.create_wallet("Savings", PIN, None).await.unwrap();
    assert_eq!(second.auth_type, AuthType::Biometrics);
}

// ============================================================================
// Addresses
// ============================================================================

#[tokio::test]
async fn test_generate_address_in_group() {
    let h = harness();
    let wallet_id = unlocked_wallet(&h).await;

    let address = h
        .session
        .generate_address(NewAddressRequest {
            group: Some(2),
            label: Some("Group two".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(address.group, 2);
    assert_ne!(address.index, 0);
    assert!(!address.is_main());
    assert!(address.settings.color.starts_with('#'));

    let stored = h.metadata.load(&wallet_id).unwrap().unwrap();
    assert_eq!(stored.addresses.len(), 2);
    assert_eq!(
        stored.address(address.index).unwrap().label.as_deref(),
        Some("Group two")
    );
}

#[tokio::test]
async fn test_generate_requires_unlock() {
    let h = harness();
    unlocked_wallet(&h).await;
    h.session.lock();
    assert!(matches!(
        h.session.generate_address(NewAddressRequest::default()).await,
        Err(Error::NotUnlocked)
    ));
}

#[tokio::test]
async fn test_main_address_bookkeeping() {
    let h = harness();
    let wallet_id = unlocked_wallet(&h).await;
    let original = h.session.main_address().unwrap();
    let second = h
        .session
        .generate_address(NewAddressRequest {
            is_main: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(second.index, 1);
    assert_eq!(h.session.main_address().unwrap().hash, second.hash);
    assert_eq!(h.session.addresses().iter().filter(|a| a.is_main()).count(), 1);

    h.session.set_main_address(&original.hash).await.unwrap();
    assert_eq!(h.session.main_address().unwrap().hash, original.hash);

    let unset = AddressSettings {
        is_default: false,
        ..original.settings.clone()
    };
    assert!(h
        .session
        .update_address_settings(&original.hash, unset)
        .await
        .is_err());

    h.session.remove_address(&original.hash).await.unwrap();
    let main = h.session.main_address().unwrap();
    assert_eq!(main.hash, second.hash);
    let stored = h.metadata.load(&wallet_id).unwrap().unwrap();
    assert_eq!(stored.addresses.len(), 1);
    assert!(stored.addresses[0].is_default);
}

#[tokio::test]
async fn test_failed_metadata_write_keeps_address_set() {
    let h = harness();
    unlocked_wallet(&h).await;
    h.metadata.set_fail_writes(true);
    let err = h
        .session
        .generate_address(NewAddressRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
    assert!(err.is_retryable());
    assert_eq!(h.session.addresses().len(), 1);
}

#[tokio::test]
async fn test_switch_wallet_reloads_addresses() {
    let h = harness();
    let first = unlocked_wallet(&h).await;
    h.session
        .generate_address(NewAddressRequest {
            label: Some("Extra".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    h.session.create_wallet("Second", PIN, None).await.unwrap();
    assert_eq!(h.session.addresses().len(), 1);

    h.session.switch_wallet(&first).await.unwrap();
    assert_eq!(h.session.state(), SessionState::Locked);
    assert!(h.session.addresses().is_empty());

    let mut events = h.session.subscribe_events();
    h.session.unlock().await.unwrap();
    let addresses = h.session.addresses();
    assert_eq!(addresses.len(), 2);
    assert_eq!(addresses[1].settings.label.as_deref(), Some("Extra"));
    assert!(drain(&mut events).contains(&SessionEvent::AddressesInitialized {
        wallet_id: first,
        count: 2
    }));
}

#[tokio::test]
async fn test_delete_loaded_wallet_locks() {
    let h = harness();
    let first = unlocked_wallet(&h).await;
    let second = h.session.create_wallet("Second", PIN, None).await.unwrap().id;

    h.session.delete_wallet(&second).await.unwrap();
    assert_eq!(h.session.state(), SessionState::Locked);
    assert!(h.session.current_wallet().is_none());
    assert!(h.metadata.load(&second).unwrap().is_none());

    let outcome = h.session.unlock().await.unwrap();
    assert_eq!(
        outcome,
        UnlockOutcome::NoStoredWallet {
            other_wallets_exist: true
        }
    );

    h.session.switch_wallet(&first).await.unwrap();
    h.session.unlock().await.unwrap();
    assert_eq!(h.session.current_wallet().unwrap().id, first);
}

#[derive(Default)]
struct GatedChain {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl ChainDataProvider for GatedChain {
    async fn fetch_balance(&self, _address: &str) -> Result<BalanceInfo, SyncError> {
        Ok(BalanceInfo {
            amount: 0,
            as_of_block: 1,
        })
    }

    async fn fetch_transaction_page(
        &self,
        _address: &str,
        _cursor: Option<&str>,
    ) -> Result<TransactionPage, SyncError> {
        Ok(TransactionPage::default())
    }

    async fn has_activity(&self, _address: &str) -> Result<bool, SyncError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(true)
    }
}

#[tokio::test]
async fn test_lock_during_discovery_discards_results() {
    let metadata = Arc::new(MemoryMetadataBackend::new());
    let chain = Arc::new(GatedChain::default());
    let (session, _auth) = session_on(metadata.clone(), chain.clone());
    let wallet_id = session
        .create_wallet("Main", PIN, Some(phrase()))
        .await
        .unwrap()
        .id;

    let discovery = {
        let session = session.clone();
        tokio::spawn(async move { session.discover_addresses().await })
    };
    chain.entered.notified().await;
    session.lock();
    chain.release.notify_one();

    let err = discovery.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::NotUnlocked));
    assert_eq!(session.state(), SessionState::Locked);
    assert_eq!(session.addresses().len(), 1);
    assert_eq!(metadata.load(&wallet_id).unwrap().unwrap().addresses.len(), 1);
}

// ============================================================================
// Import
// ============================================================================

/// Memory backend whose `fail_on`-th save fails
struct FailNthSave {
    inner: MemoryMetadataBackend,
    saves: AtomicUsize,
    fail_on: usize,
}

impl FailNthSave {
    fn new(fail_on: usize) -> Self {
        Self {
            inner: MemoryMetadataBackend::new(),
            saves: AtomicUsize::new(0),
            fail_on,
        }
    }
}

impl MetadataBackend for FailNthSave {
    fn load(&self, wallet_id: &str) -> alph_storage::Result<Option<WalletMetadata>> {
        self.inner.load(wallet_id)
    }

    fn save(&self, metadata: &WalletMetadata) -> alph_storage::Result<()> {
        if self.saves.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
            return Err(alph_storage::Error::WriteFailed(metadata.id.clone()));
        }
        self.inner.save(metadata)
    }

    fn delete(&self, wallet_id: &str) -> alph_storage::Result<()> {
        self.inner.delete(wallet_id)
    }
}

fn derived_address(index: u32) -> String {
    let deriver = AddressDeriver::new(
        Arc::new(Bip44Derivation::new(&Network::mainnet()).unwrap()),
        DeriverConfig::default(),
    );
    let seed = phrase().to_master_seed("").unwrap();
    deriver.derive_at(&seed, index).unwrap().hash
}

fn export(password: &str) -> alph_core::EncryptedPayload {
    let data = WalletImportData {
        mnemonic: Zeroizing::new(PHRASE.to_string()),
        addresses: vec![
            ImportedAddress {
                index: 0,
                label: Some("Spending".to_string()),
                color: Some("#FF5D51".to_string()),
                is_default: false,
            },
            ImportedAddress {
                index: 3,
                label: Some("Savings".to_string()),
                color: None,
                is_default: true,
            },
        ],
        contacts: vec![Contact {
            id: "c1".to_string(),
            name: "Alice".to_string(),
            address: derived_address(7),
        }],
    };
    seal_export_payload(password, &data).unwrap()
}

#[tokio::test]
async fn test_import_restores_addresses_and_contacts() {
    let h = harness();
    let wallet = h
        .session
        .import_wallet_from_payload("Imported", PIN, "desktop-password", &export("desktop-password"))
        .await
        .unwrap();

    let addresses = h.session.addresses();
    let indexes: Vec<u32> = addresses.iter().map(|a| a.index).collect();
    assert_eq!(indexes, vec![0, 3]);
    assert_eq!(h.session.main_address().unwrap().index, 3);
    assert_eq!(addresses[0].settings.color, "#FF5D51");
    assert_eq!(addresses[0].hash, derived_address(0));

    let contacts = h.session.contacts().unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(h.session.filter_contacts("ali").unwrap().len(), 1);
    assert_eq!(h.metadata.load(&wallet.id).unwrap().unwrap().contacts.len(), 1);
}

#[tokio::test]
async fn test_import_wrong_password_stores_nothing() {
    let h = harness();
    let err = h
        .session
        .import_wallet_from_payload("Imported", PIN, "wrong", &export("right"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Core(alph_core::Error::Import(alph_core::ImportError::Decryption))
    ));
    assert!(h.session.wallets().await.unwrap().is_empty());
    assert_eq!(h.session.state(), SessionState::Locked);
}

#[tokio::test]
async fn test_failed_import_write_leaves_no_wallet() {
    let backend = Arc::new(FailNthSave::new(1));
    let (session, _auth) = session_on(backend.clone(), Arc::new(StaticChain::default()));
    let payload = export("desktop-password");

    let err = session
        .import_wallet_from_payload("Imported", PIN, "desktop-password", &payload)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
    assert!(session.wallets().await.unwrap().is_empty());
    assert_eq!(session.state(), SessionState::Locked);

    let wallet = session
        .import_wallet_from_payload("Imported", PIN, "desktop-password", &payload)
        .await
        .unwrap();
    let stored = backend.load(&wallet.id).unwrap().unwrap();
    assert_eq!(stored.addresses.len(), 2);
    assert_eq!(stored.contacts.len(), 1);
}

#[tokio::test]
async fn test_import_writes_metadata_once() {
    // A second write would fail; addresses and contacts must land together
    let backend = Arc::new(FailNthSave::new(2));
    let (session, _auth) = session_on(backend.clone(), Arc::new(StaticChain::default()));

    let wallet = session
        .import_wallet_from_payload("Imported", PIN, "desktop-password", &export("desktop-password"))
        .await
        .unwrap();
    assert_eq!(backend.saves.load(Ordering::SeqCst), 1);
    assert_eq!(session.contacts().unwrap().len(), 1);
    assert_eq!(backend.load(&wallet.id).unwrap().unwrap().addresses.len(), 2);
}

// ============================================================================
// Contacts, sync and pending transactions
// ============================================================================

#[tokio::test]
async fn test_contact_operations() {
    let h = harness();
    unlocked_wallet(&h).await;

    let contact = h.session.add_contact("Bob", &derived_address(4)).unwrap();
    assert!(h.session.add_contact("", &derived_address(5)).is_err());
    assert!(h.session.add_contact("Eve", "not-an-address").is_err());

    let renamed = Contact {
        name: "Robert".to_string(),
        ..contact.clone()
    };
    h.session.update_contact(renamed).unwrap();
    assert_eq!(h.session.filter_contacts("ROB").unwrap().len(), 1);

    h.session.delete_contact(&contact.id).unwrap();
    assert!(h.session.contacts().unwrap().is_empty());
}

#[tokio::test]
async fn test_sync_on_unlock() {
    let h = harness_with(SessionConfig {
        sync_on_unlock: true,
        ..test_config()
    });
    unlocked_wallet(&h).await;
    assert_eq!(h.chain.balance_calls.load(Ordering::SeqCst), 1);

    let main = h.session.main_address().unwrap();
    let state = h.session.address_sync_state(&main.hash).unwrap();
    assert_eq!(state.balance.map(|b| b.amount), Some(1_000));

    h.session.lock();
    h.session.unlock().await.unwrap();
    assert_eq!(h.chain.balance_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_pending_transactions() {
    let h = harness();
    unlocked_wallet(&h).await;
    let main = h.session.main_address().unwrap();
    let tx = Transaction {
        hash: "tx1".to_string(),
        address_hash: main.hash.clone(),
        timestamp_ms: 1,
        amount: -500,
    };

    assert!(h.session.add_pending_transaction(&main.hash, tx.clone()).unwrap());
    assert!(!h.session.add_pending_transaction(&main.hash, tx.clone()).unwrap());
    assert!(h.session.add_pending_transaction("unknown", tx).is_err());

    h.session.sync_addresses().await.unwrap();
    let state = h.session.address_sync_state(&main.hash).unwrap();
    assert_eq!(state.pending_transactions.len(), 1);
}
