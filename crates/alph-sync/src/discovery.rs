//! Address discovery after import
//!
//! Walks child indexes from 0 and stops after `gap_limit` consecutive
//! addresses without on-chain activity. `keep_going` is consulted after
//! every provider call; once it returns false the walk ends with
//! [`Error::Cancelled`] and nothing found so far is returned.

use crate::error::{Error, Result};
use crate::provider::ChainDataProvider;
use alph_core::{AddressData, AddressDeriver, MasterSeed};
use tracing::{debug, info};

/// Active addresses among the first indexes of `seed`
pub async fn discover_addresses(
    deriver: &AddressDeriver,
    seed: &MasterSeed,
    provider: &dyn ChainDataProvider,
    gap_limit: u32,
    keep_going: &(dyn Fn() -> bool + Send + Sync),
) -> Result<Vec<AddressData>> {
    let mut active = Vec::new();
    let mut gap = 0u32;
    let mut index = 0u32;

    while gap < gap_limit {
        let data = deriver.derive_at(seed, index)?;
        let used = provider.has_activity(&data.hash).await?;
        if !keep_going() {
            debug!(event = "discovery_cancelled", index, "Address discovery cancelled");
            return Err(Error::Cancelled);
        }
        if used {
            debug!(event = "address_discovered", index, address = %data.hash, "Found active address");
            active.push(data);
            gap = 0;
        } else {
            gap += 1;
        }
        index = match index.checked_add(1) {
            Some(next) => next,
            None => break,
        };
    }

    info!(
        event = "discovery_complete",
        found = active.len(),
        scanned = index,
        "Address discovery complete"
    );
    Ok(active)
}
