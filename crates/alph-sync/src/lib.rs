//! Address balance and history synchronization
//!
//! Coordinates balance, history and mempool fetches for address sets against
//! a pluggable [`ChainDataProvider`], with one running sync per address and
//! all-or-nothing commits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod coordinator;
pub mod discovery;
pub mod error;
mod inflight;
pub mod provider;
pub mod state;

pub use coordinator::{SyncConfig, SyncCoordinator, SyncEvent, SyncOutcome};
pub use discovery::discover_addresses;
pub use error::{Error, Result, SyncError};
pub use provider::{BalanceInfo, ChainDataProvider, Transaction, TransactionPage};
pub use state::AddressSyncState;
