//! In-process stand-ins for the host authenticator and the explorer

use alph_core::WalletId;
use alph_session::{AuthError, Authenticator, BiometricAvailability, Secret};
use alph_sync::{BalanceInfo, ChainDataProvider, SyncError, Transaction, TransactionPage};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::debug;

/// Answers PIN prompts with a fixed PIN after dismissing the first few
pub struct PinPad {
    pin: String,
    cancels_left: AtomicU32,
}

impl PinPad {
    pub fn new(pin: impl Into<String>, cancels: u32) -> Self {
        Self {
            pin: pin.into(),
            cancels_left: AtomicU32::new(cancels),
        }
    }
}

#[async_trait]
impl Authenticator for PinPad {
    async fn biometric_availability(&self) -> BiometricAvailability {
        BiometricAvailability::Unsupported
    }

    async fn prompt_pin(&self, wallet_id: &WalletId) -> Result<Secret, AuthError> {
        let dismissed = self
            .cancels_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if dismissed {
            debug!(wallet_id = %wallet_id, "PIN prompt dismissed");
            return Err(AuthError::Cancelled);
        }
        Ok(Secret::from_pin(&self.pin))
    }

    async fn prompt_biometric(&self, _wallet_id: &WalletId) -> Result<Secret, AuthError> {
        Err(AuthError::Unavailable)
    }

    async fn register_biometric_secret(
        &self,
        _wallet_id: &WalletId,
        _secret: &[u8],
    ) -> Result<(), AuthError> {
        Err(AuthError::Unavailable)
    }
}

/// Deterministic explorer
///
/// Every address in `active` has `pages` history pages of `page_size`
/// transactions. Cursors are page numbers.
pub struct SimulatedChain {
    active: HashSet<String>,
    pages: u32,
    page_size: u32,
    latency: Duration,
}

impl SimulatedChain {
    pub fn new(active: HashSet<String>, pages: u32, page_size: u32, latency: Duration) -> Self {
        Self {
            active,
            pages,
            page_size,
            latency,
        }
    }

    /// Pages one active address has
    pub fn pages(&self) -> u32 {
        self.pages
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn amount(page: u32, position: u32, page_size: u32) -> i128 {
        i128::from(page * page_size + position + 1) * 1_000
    }
}

#[async_trait]
impl ChainDataProvider for SimulatedChain {
    async fn fetch_balance(&self, address: &str) -> Result<BalanceInfo, SyncError> {
        self.delay().await;
        let total = u64::from(self.pages) * u64::from(self.page_size);
        let amount = if self.active.contains(address) {
            // Sum of 1..=total, in thousands
            u128::from(total) * u128::from(total + 1) / 2 * 1_000
        } else {
            0
        };
        Ok(BalanceInfo {
            amount,
            as_of_block: 1_000_000,
        })
    }

    async fn fetch_transaction_page(
        &self,
        address: &str,
        cursor: Option<&str>,
    ) -> Result<TransactionPage, SyncError> {
        self.delay().await;
        if !self.active.contains(address) {
            return Ok(TransactionPage::default());
        }
        let page = match cursor {
            None => 0,
            Some(c) => c
                .parse::<u32>()
                .map_err(|_| SyncError::BackendRejected(format!("bad cursor {}", c)))?,
        };
        if page >= self.pages {
            return Ok(TransactionPage::default());
        }

        let items = (0..self.page_size)
            .map(|position| Transaction {
                hash: format!("{}-{}-{}", &address[..8.min(address.len())], page, position),
                address_hash: address.to_string(),
                timestamp_ms: 1_700_000_000_000
                    - u64::from(page * self.page_size + position) * 60_000,
                amount: Self::amount(page, position, self.page_size),
            })
            .collect();
        let next = page + 1;
        Ok(TransactionPage {
            items,
            next_cursor: (next < self.pages).then(|| next.to_string()),
        })
    }
}
