//! Address Directory
//!
//! Maps (currency, address) to the owning user. The ledger store is
//! authoritative; the KV store holds a 7-day read-through cache used on the
//! hot path of every observation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::chain::{ChainClients, ChainError};
use crate::storage::{keys, KvStore, LedgerStore, StorageError};
use crate::types::{Currency, DepositAddress};

/// Owner cache lifetime
pub const ADDRESS_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(Currency),

    #[error("Chain returned an unusable address: {0:?}")]
    InvalidAddress(String),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct AddressDirectory {
    ledger: Arc<dyn LedgerStore>,
    cache: Arc<dyn KvStore>,
    chains: ChainClients,
}

impl AddressDirectory {
    pub fn new(ledger: Arc<dyn LedgerStore>, cache: Arc<dyn KvStore>, chains: ChainClients) -> Self {
        Self {
            ledger,
            cache,
            chains,
        }
    }

    pub fn supports(&self, currency: Currency) -> bool {
        self.chains.contains_key(&currency)
    }

    /// Generate and persist a new deposit address for a user
    pub async fn assign_address(
        &self,
        user_id: &str,
        currency: Currency,
    ) -> Result<DepositAddress, DirectoryError> {
        let chain = self
            .chains
            .get(&currency)
            .ok_or(DirectoryError::UnsupportedCurrency(currency))?;

        let raw = chain.generate_address(user_id).await?;
        if raw.trim().is_empty() {
            return Err(DirectoryError::InvalidAddress(raw));
        }

        let address = DepositAddress::new(user_id.to_string(), currency, &raw);
        self.ledger.insert_address(&address).await?;
        self.cache_owner(currency, &address.address, user_id).await;

        info!(
            user_id = %user_id,
            currency = %currency,
            address = %address.address,
            "Assigned deposit address"
        );

        Ok(address)
    }

    /// Owner of an address, cache first
    pub async fn resolve_owner(
        &self,
        currency: Currency,
        address: &str,
    ) -> Result<Option<String>, DirectoryError> {
        let address = currency.normalize_address(address);
        let key = keys::address_owner(currency, &address);

        match self.cache.get(&key).await {
            Ok(Some(owner)) => {
                // Sliding expiry for addresses that keep receiving funds
                if let Err(e) = self.cache.set(&key, &owner, Some(ADDRESS_CACHE_TTL)).await {
                    warn!(key = %key, error = %e, "Failed to refresh owner cache");
                }
                return Ok(Some(owner));
            }
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "Owner cache read failed, using store"),
        }

        let owner = self.ledger.address_owner(currency, &address).await?;
        if let Some(owner) = &owner {
            self.cache_owner(currency, &address, owner).await;
        }
        Ok(owner)
    }

    /// Every watched address for a currency, from the authoritative store
    pub async fn addresses_for_currency(
        &self,
        currency: Currency,
    ) -> Result<HashSet<String>, DirectoryError> {
        let addresses = self.ledger.addresses_for_currency(currency).await?;
        Ok(addresses.into_iter().collect())
    }

    pub async fn addresses_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<DepositAddress>, DirectoryError> {
        Ok(self.ledger.addresses_for_user(user_id).await?)
    }

    pub fn validate_address(&self, currency: Currency, address: &str) -> bool {
        currency.validate_address(address)
    }

    async fn cache_owner(&self, currency: Currency, address: &str, owner: &str) {
        let key = keys::address_owner(currency, address);
        if let Err(e) = self.cache.set(&key, owner, Some(ADDRESS_CACHE_TTL)).await {
            warn!(key = %key, error = %e, "Failed to cache address owner");
        }
    }
}
