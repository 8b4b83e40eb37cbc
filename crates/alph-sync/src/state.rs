//! Per-address sync state

use crate::provider::{BalanceInfo, Transaction, TransactionPage};
use alph_core::AddressHash;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Cached chain data of one address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSyncState {
    /// Address
    pub address_hash: AddressHash,
    /// Last fetched balance
    pub balance: Option<BalanceInfo>,
    /// Height of the last full refresh
    pub last_synced_block: Option<u64>,
    /// Cursor of the next older page
    pub next_cursor: Option<String>,
    /// Confirmed history, newest first
    pub confirmed_transactions: Vec<Transaction>,
    /// Pending transactions, unique by hash
    pub pending_transactions: Vec<Transaction>,
    /// Whether older pages remain
    pub has_more_pages: bool,
}

fn newest_first(a: &Transaction, b: &Transaction) -> Ordering {
    b.timestamp_ms
        .cmp(&a.timestamp_ms)
        .then_with(|| a.hash.cmp(&b.hash))
}

fn dedup_key(tx: &Transaction) -> (String, String) {
    let (hash, address) = tx.key();
    (hash.to_string(), address.to_string())
}

impl AddressSyncState {
    /// Never-synced state
    pub fn new(address_hash: impl Into<AddressHash>) -> Self {
        Self {
            address_hash: address_hash.into(),
            balance: None,
            last_synced_block: None,
            next_cursor: None,
            confirmed_transactions: Vec::new(),
            pending_transactions: Vec::new(),
            has_more_pages: true,
        }
    }

    fn owned(&self, mut items: Vec<Transaction>) -> Vec<Transaction> {
        for tx in items.iter_mut() {
            tx.address_hash = self.address_hash.clone();
        }
        items
    }

    fn merge_confirmed(&mut self, items: Vec<Transaction>) -> usize {
        let before = self.confirmed_transactions.len();
        let mut seen: HashSet<(String, String)> = self
            .confirmed_transactions
            .iter()
            .map(dedup_key)
            .collect();
        for tx in self.owned(items) {
            if seen.insert(dedup_key(&tx)) {
                self.confirmed_transactions.push(tx);
            }
        }
        self.confirmed_transactions.sort_by(newest_first);
        self.confirmed_transactions.len() - before
    }

    fn drop_confirmed_pending(&mut self) {
        let confirmed: HashSet<&str> = self
            .confirmed_transactions
            .iter()
            .map(|tx| tx.hash.as_str())
            .collect();
        self.pending_transactions
            .retain(|tx| !confirmed.contains(tx.hash.as_str()));
    }

    /// Replace cached data with a full refresh
    ///
    /// Confirmed history becomes the newest page. Pending entries are the
    /// provider's mempool view plus local submissions that are not confirmed
    /// yet.
    pub fn apply_refresh(
        &mut self,
        balance: BalanceInfo,
        page: TransactionPage,
        mempool: Vec<Transaction>,
        max_pending: usize,
    ) {
        self.last_synced_block = Some(balance.as_of_block);
        self.balance = Some(balance);
        self.confirmed_transactions.clear();
        self.merge_confirmed(page.items);
        self.has_more_pages = page.next_cursor.is_some();
        self.next_cursor = page.next_cursor;

        let local = std::mem::take(&mut self.pending_transactions);
        for tx in self.owned(mempool).into_iter().chain(local) {
            self.insert_pending(tx, max_pending);
        }
        self.drop_confirmed_pending();
    }

    /// Append an older page
    ///
    /// Returns the number of transactions not already cached.
    pub fn append_page(&mut self, page: TransactionPage) -> usize {
        let appended = self.merge_confirmed(page.items);
        self.has_more_pages = page.next_cursor.is_some();
        self.next_cursor = page.next_cursor;
        self.drop_confirmed_pending();
        appended
    }

    /// Record a locally submitted transaction
    ///
    /// Returns `false` when the transaction is already known.
    pub fn add_pending(&mut self, tx: Transaction, max_pending: usize) -> bool {
        let known = self
            .confirmed_transactions
            .iter()
            .chain(self.pending_transactions.iter())
            .any(|existing| existing.hash == tx.hash);
        if known {
            return false;
        }
        let mut tx = tx;
        tx.address_hash = self.address_hash.clone();
        self.insert_pending(tx, max_pending);
        true
    }

    fn insert_pending(&mut self, tx: Transaction, max_pending: usize) {
        if self.pending_transactions.iter().any(|p| p.hash == tx.hash) {
            return;
        }
        self.pending_transactions.push(tx);
        self.pending_transactions.sort_by(newest_first);
        self.pending_transactions.truncate(max_pending.max(1));
    }
}
