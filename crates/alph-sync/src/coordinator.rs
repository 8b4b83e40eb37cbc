//! Balance and history sync for address sets
//!
//! Fetches for a whole set are staged first and committed only when every
//! request succeeded, so a failed sync never leaves a partially updated set.
//! Results fetched before a [`SyncCoordinator::clear`] are discarded.

use crate::error::{Error, Result, SyncError};
use crate::inflight::{InflightLease, InflightRegistry, SetKey};
use crate::provider::{BalanceInfo, ChainDataProvider, Transaction, TransactionPage};
use crate::state::AddressSyncState;
use alph_core::AddressHash;
use alph_params::DEFAULT_DISCOVERY_GAP_LIMIT;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Sync limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Consecutive unused addresses before discovery stops
    pub discovery_gap_limit: u32,
    /// Pending transactions kept per address
    pub max_pending_per_address: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            discovery_gap_limit: DEFAULT_DISCOVERY_GAP_LIMIT,
            max_pending_per_address: 50,
        }
    }
}

/// Result of a sync request that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Full refresh committed
    Synced {
        /// Addresses refreshed
        addresses: usize,
    },
    /// Older page committed
    PageAppended {
        /// Transactions added across the set
        appended: usize,
    },
    /// Some address has no older page; nothing fetched
    NoMorePages,
    /// An overlapping sync is running; request dropped
    AlreadyInFlight,
    /// Cached state was cleared while fetching; results dropped
    Superseded,
}

/// Notification published after each sync request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Full refresh committed
    Synced {
        /// Addresses refreshed
        addresses: Vec<AddressHash>,
    },
    /// Older page committed
    PageAppended {
        /// Addresses paged
        addresses: Vec<AddressHash>,
        /// Transactions added
        appended: usize,
    },
    /// Sync failed; state unchanged
    Failed {
        /// Addresses requested
        addresses: Vec<AddressHash>,
        /// Failure
        reason: SyncError,
    },
    /// Request dropped because a sync was already running
    Skipped {
        /// Addresses requested
        addresses: Vec<AddressHash>,
    },
}

struct StagedRefresh {
    address: AddressHash,
    balance: BalanceInfo,
    page: TransactionPage,
    mempool: Vec<Transaction>,
}

/// Sync coordinator
pub struct SyncCoordinator {
    provider: Arc<dyn ChainDataProvider>,
    states: RwLock<HashMap<AddressHash, AddressSyncState>>,
    inflight: InflightRegistry,
    events: broadcast::Sender<SyncEvent>,
    config: SyncConfig,
    generation: AtomicU64,
}

impl SyncCoordinator {
    /// Create a coordinator
    pub fn new(provider: Arc<dyn ChainDataProvider>, config: SyncConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            provider,
            states: RwLock::new(HashMap::new()),
            inflight: InflightRegistry::new(),
            events,
            config,
            generation: AtomicU64::new(0),
        }
    }

    /// Chain data source
    pub fn provider(&self) -> Arc<dyn ChainDataProvider> {
        self.provider.clone()
    }

    /// Sync limits
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Subscribe to sync events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Cached state of one address
    pub fn state(&self, address: &str) -> Option<AddressSyncState> {
        self.states.read().get(address).cloned()
    }

    /// Cached states of `addresses`, skipping never-seen ones
    pub fn states(&self, addresses: &[AddressHash]) -> Vec<AddressSyncState> {
        let states = self.states.read();
        addresses
            .iter()
            .filter_map(|a| states.get(a).cloned())
            .collect()
    }

    /// Whether an overlapping sync is running
    pub fn is_syncing(&self, addresses: &[AddressHash]) -> bool {
        self.inflight.is_busy(&set_key(addresses))
    }

    /// Full refresh of balances, newest history page and pending transactions
    pub async fn sync_balances_and_history(&self, addresses: &[AddressHash]) -> Result<SyncOutcome> {
        let key = set_key(addresses);
        if key.is_empty() {
            return Ok(SyncOutcome::Synced { addresses: 0 });
        }
        let requested: Vec<AddressHash> = key.iter().cloned().collect();

        let _token = match self.inflight.acquire(&key) {
            InflightLease::Leader(token) => token,
            InflightLease::Busy => {
                debug!(event = "sync_skipped", addresses = key.len(), "Sync already in flight");
                self.publish(SyncEvent::Skipped { addresses: requested });
                return Ok(SyncOutcome::AlreadyInFlight);
            }
        };

        let generation = self.generation.load(Ordering::SeqCst);
        let staged = match self.fetch_refresh(&requested).await {
            Ok(staged) => staged,
            Err(reason) => return Err(self.fail(requested, reason)),
        };

        {
            let mut states = self.states.write();
            if self.generation.load(Ordering::SeqCst) != generation {
                drop(states);
                return Ok(self.superseded(requested));
            }
            for refresh in staged {
                states
                    .entry(refresh.address.clone())
                    .or_insert_with(|| AddressSyncState::new(refresh.address.clone()))
                    .apply_refresh(
                        refresh.balance,
                        refresh.page,
                        refresh.mempool,
                        self.config.max_pending_per_address,
                    );
            }
        }

        info!(event = "sync_committed", addresses = requested.len(), "Synced balances and history");
        let count = requested.len();
        self.publish(SyncEvent::Synced { addresses: requested });
        Ok(SyncOutcome::Synced { addresses: count })
    }

    async fn fetch_refresh(
        &self,
        addresses: &[AddressHash],
    ) -> std::result::Result<Vec<StagedRefresh>, SyncError> {
        let mut staged = Vec::with_capacity(addresses.len());
        for address in addresses {
            let balance = self.provider.fetch_balance(address).await?;
            let page = self.provider.fetch_transaction_page(address, None).await?;
            let mempool = self.provider.fetch_pending_transactions(address).await?;
            debug!(
                event = "address_fetched",
                address = %address,
                as_of_block = balance.as_of_block,
                transactions = page.items.len(),
                "Fetched address data"
            );
            staged.push(StagedRefresh {
                address: address.clone(),
                balance,
                page,
                mempool,
            });
        }
        Ok(staged)
    }

    /// Append the next older history page of every address
    ///
    /// Does nothing when any address has no more pages.
    pub async fn sync_next_page(&self, addresses: &[AddressHash]) -> Result<SyncOutcome> {
        let key = set_key(addresses);
        if key.is_empty() || self.any_exhausted(&key) {
            return Ok(SyncOutcome::NoMorePages);
        }
        let requested: Vec<AddressHash> = key.iter().cloned().collect();

        let _token = match self.inflight.acquire(&key) {
            InflightLease::Leader(token) => token,
            InflightLease::Busy => {
                self.publish(SyncEvent::Skipped { addresses: requested });
                return Ok(SyncOutcome::AlreadyInFlight);
            }
        };
        // A refresh may have finished between the check and the lease
        if self.any_exhausted(&key) {
            return Ok(SyncOutcome::NoMorePages);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let cursors: Vec<(AddressHash, Option<String>)> = {
            let states = self.states.read();
            requested
                .iter()
                .map(|a| (a.clone(), states.get(a).and_then(|s| s.next_cursor.clone())))
                .collect()
        };

        let mut pages = Vec::with_capacity(cursors.len());
        for (address, cursor) in cursors {
            match self
                .provider
                .fetch_transaction_page(&address, cursor.as_deref())
                .await
            {
                Ok(page) => pages.push((address, page)),
                Err(reason) => return Err(self.fail(requested, reason)),
            }
        }

        let mut appended = 0;
        {
            let mut states = self.states.write();
            if self.generation.load(Ordering::SeqCst) != generation {
                drop(states);
                return Ok(self.superseded(requested));
            }
            for (address, page) in pages {
                appended += states
                    .entry(address.clone())
                    .or_insert_with(|| AddressSyncState::new(address))
                    .append_page(page);
            }
        }

        debug!(event = "page_appended", addresses = requested.len(), appended, "Appended history page");
        self.publish(SyncEvent::PageAppended {
            addresses: requested,
            appended,
        });
        Ok(SyncOutcome::PageAppended { appended })
    }

    fn any_exhausted(&self, key: &SetKey) -> bool {
        let states = self.states.read();
        key.iter()
            .any(|a| states.get(a).map(|s| !s.has_more_pages).unwrap_or(false))
    }

    fn superseded(&self, addresses: Vec<AddressHash>) -> SyncOutcome {
        debug!(
            event = "sync_superseded",
            addresses = addresses.len(),
            "State cleared while fetching; dropping results"
        );
        self.publish(SyncEvent::Skipped { addresses });
        SyncOutcome::Superseded
    }

    fn fail(&self, addresses: Vec<AddressHash>, reason: SyncError) -> Error {
        warn!(
            event = "sync_failed",
            addresses = addresses.len(),
            error = %reason,
            "Sync failed; cached state kept"
        );
        self.publish(SyncEvent::Failed {
            addresses,
            reason: reason.clone(),
        });
        Error::SyncFailed(reason)
    }

    /// Record a locally submitted transaction
    pub fn add_pending_transaction(&self, address: &str, tx: Transaction) -> bool {
        let mut states = self.states.write();
        states
            .entry(address.to_string())
            .or_insert_with(|| AddressSyncState::new(address))
            .add_pending(tx, self.config.max_pending_per_address)
    }

    /// Forget one address
    pub fn forget(&self, address: &str) {
        self.states.write().remove(address);
    }

    /// Forget every address
    ///
    /// Syncs still fetching when this runs commit nothing.
    pub fn clear(&self) {
        let mut states = self.states.write();
        states.clear();
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

fn set_key(addresses: &[AddressHash]) -> SetKey {
    addresses.iter().cloned().collect()
}
