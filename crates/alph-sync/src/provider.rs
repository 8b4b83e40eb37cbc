//! Chain data provider boundary

use crate::error::SyncError;
use alph_core::AddressHash;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Balance snapshot of one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceInfo {
    /// Balance in attoALPH
    pub amount: u128,
    /// Chain height the balance was read at
    pub as_of_block: u64,
}

/// Transaction touching an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Transaction hash
    pub hash: String,
    /// Address whose history holds this entry
    pub address_hash: AddressHash,
    /// Block timestamp, or submission time for pending entries (ms)
    pub timestamp_ms: u64,
    /// Net change for the address in attoALPH
    pub amount: i128,
}

impl Transaction {
    /// Deduplication key: `(hash, owning address)`
    pub fn key(&self) -> (&str, &str) {
        (self.hash.as_str(), self.address_hash.as_str())
    }
}

/// One page of history, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionPage {
    /// Transactions
    pub items: Vec<Transaction>,
    /// Opaque cursor of the next older page
    pub next_cursor: Option<String>,
}

/// Blockchain data source
///
/// Cursors are opaque and forward-only: passing the cursor of a page returns
/// the page after it.
#[async_trait]
pub trait ChainDataProvider: Send + Sync {
    /// Current balance
    async fn fetch_balance(&self, address: &str) -> Result<BalanceInfo, SyncError>;

    /// History page; `None` requests the newest page
    async fn fetch_transaction_page(
        &self,
        address: &str,
        cursor: Option<&str>,
    ) -> Result<TransactionPage, SyncError>;

    /// Mempool transactions
    async fn fetch_pending_transactions(&self, _address: &str) -> Result<Vec<Transaction>, SyncError> {
        Ok(Vec::new())
    }

    /// Whether the address ever appeared on chain
    async fn has_activity(&self, address: &str) -> Result<bool, SyncError> {
        Ok(!self.fetch_transaction_page(address, None).await?.items.is_empty())
    }
}
