//! Storage Trait Definitions
//!
//! Two stores back the pipeline:
//! - `LedgerStore` - authoritative addresses, transactions and balances
//! - `KvStore` - locks, idempotency markers, watcher cursors and caches
//!
//! Implementations can use SQLite (production) or in-memory (testing).

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::types::{
    BalanceRecord, Currency, DepositAddress, LedgerOutcome, LedgerUpdate, TransactionRecord,
};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable ledger interface
///
/// Implementations:
/// - `SqliteLedgerStore` - SQLite with an r2d2 pool
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Persist a new deposit address; `Duplicate` if (currency, address) exists
    async fn insert_address(&self, address: &DepositAddress) -> StorageResult<()>;

    /// Owner of an address, if it was ever assigned
    async fn address_owner(&self, currency: Currency, address: &str)
        -> StorageResult<Option<String>>;

    /// Every address assigned for a currency
    async fn addresses_for_currency(&self, currency: Currency) -> StorageResult<Vec<String>>;

    /// Every address assigned to a user
    async fn addresses_for_user(&self, user_id: &str) -> StorageResult<Vec<DepositAddress>>;

    /// Upsert the transaction row and, when it reaches the threshold, credit
    /// the balance. Both happen in one database transaction or not at all.
    async fn apply_observation(&self, update: &LedgerUpdate) -> StorageResult<LedgerOutcome>;

    /// All transactions still pending, oldest first
    async fn pending_transactions(&self) -> StorageResult<Vec<TransactionRecord>>;

    /// Move a pending transaction to failed. Returns false if it was no
    /// longer pending.
    async fn mark_failed(&self, id: &str) -> StorageResult<bool>;

    /// A user's transactions, newest first
    async fn transaction_history(
        &self,
        user_id: &str,
        currency: Option<Currency>,
    ) -> StorageResult<Vec<TransactionRecord>>;

    /// Look up a transaction by hash across currencies
    async fn transaction_by_hash(&self, tx_hash: &str) -> StorageResult<Option<TransactionRecord>>;

    /// A user's balance in one currency
    async fn balance(&self, user_id: &str, currency: Currency)
        -> StorageResult<Option<BalanceRecord>>;

    /// Every balance row a user holds, ordered by currency
    async fn balances(&self, user_id: &str) -> StorageResult<Vec<BalanceRecord>>;

    /// Transaction counts keyed by status
    async fn count_by_status(&self) -> StorageResult<HashMap<String, u64>>;
}

/// Lock and cache interface with per-key expiry
///
/// Implementations:
/// - `MemoryKvStore` - process-local, for tests and single-node setups
/// - `SqliteKvStore` - survives restarts
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Value for a live key
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Unconditional write; `None` never expires
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<()>;

    /// Write only if the key is absent or expired. Returns whether it was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<bool>;

    /// Remove a key. Returns whether a live key was removed.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Remove a key only while it still holds `value`
    async fn delete_if_value(&self, key: &str, value: &str) -> StorageResult<bool>;

    /// Live keys starting with `prefix`
    async fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;
}
