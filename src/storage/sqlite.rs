//! SQLite Persistent Storage for the Deposit Ledger
//!
//! Provides durable storage for addresses, transactions and balances that
//! survives service restarts. Uses connection pooling via r2d2 for
//! concurrent access; every write that touches a transaction row runs inside
//! a `BEGIN IMMEDIATE` transaction so concurrent writers serialize on the
//! database write lock.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use super::traits::{LedgerStore, StorageError, StorageResult};
use crate::types::{
    now_secs, plan_transition, BalanceRecord, Currency, DepositAddress, LedgerOutcome,
    LedgerUpdate, TransactionRecord, Transition, TxStatus,
};

/// Shared connection pool type
pub type SqlitePool = Pool<SqliteConnectionManager>;

/// Open (or create) a database file and build a pool for it
pub fn open_pool<P: AsRef<Path>>(db_path: P) -> Result<SqlitePool, StorageError> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.as_ref().parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let manager = SqliteConnectionManager::file(db_path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000; PRAGMA synchronous = NORMAL;",
        )
    });
    Pool::builder()
        .max_size(10)
        .build(manager)
        .map_err(|e| StorageError::Connection(e.to_string()))
}

/// Single-connection in-memory pool (for testing)
///
/// Every pooled connection to `:memory:` is a separate database, so the pool
/// is capped at one connection that is never recycled.
pub fn memory_pool() -> Result<SqlitePool, StorageError> {
    let manager = SqliteConnectionManager::memory();
    Pool::builder()
        .max_size(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .build(manager)
        .map_err(|e| StorageError::Connection(e.to_string()))
}

/// SQLite-backed ledger store
#[derive(Clone)]
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    /// Create a new store with the given database path
    ///
    /// Creates the database file and runs migrations if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        Self::from_pool(open_pool(db_path)?)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::from_pool(memory_pool()?)
    }

    /// Build on an existing pool, running migrations
    pub fn from_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        let store = Self { pool };
        store.run_migrations()?;
        Ok(store)
    }

    /// Get a connection from the pool
    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS deposit_addresses (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                currency TEXT NOT NULL,
                address TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE (currency, address)
            );

            CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                currency TEXT NOT NULL,
                tx_type TEXT NOT NULL DEFAULT 'deposit',
                amount INTEGER NOT NULL,
                address TEXT NOT NULL,
                tx_hash TEXT NOT NULL,
                confirmations INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                block_number INTEGER,
                created_at INTEGER NOT NULL,
                confirmed_at INTEGER,
                UNIQUE (currency, tx_hash)
            );

            CREATE TABLE IF NOT EXISTS balances (
                user_id TEXT NOT NULL,
                currency TEXT NOT NULL,
                amount INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, currency)
            );

            CREATE INDEX IF NOT EXISTS idx_addresses_user ON deposit_addresses(user_id);
            CREATE INDEX IF NOT EXISTS idx_transactions_status ON transactions(status);
            CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_transactions_hash ON transactions(tx_hash);
            "#,
        )?;

        Ok(())
    }

    /// Convert a database row to DepositAddress
    fn row_to_address(row: &rusqlite::Row) -> rusqlite::Result<DepositAddress> {
        Ok(DepositAddress {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            currency: parse_column(row, "currency")?,
            address: row.get("address")?,
            created_at: row.get::<_, i64>("created_at")? as u64,
        })
    }

    /// Convert a database row to TransactionRecord
    fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<TransactionRecord> {
        Ok(TransactionRecord {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            currency: parse_column(row, "currency")?,
            tx_type: parse_column(row, "tx_type")?,
            amount: row.get::<_, i64>("amount")? as u64,
            address: row.get("address")?,
            tx_hash: row.get("tx_hash")?,
            confirmations: row.get::<_, i64>("confirmations")? as u32,
            status: parse_column(row, "status")?,
            block_number: row.get::<_, Option<i64>>("block_number")?.map(|v| v as u64),
            created_at: row.get::<_, i64>("created_at")? as u64,
            confirmed_at: row.get::<_, Option<i64>>("confirmed_at")?.map(|v| v as u64),
        })
    }

    fn row_to_balance(row: &rusqlite::Row) -> rusqlite::Result<BalanceRecord> {
        Ok(BalanceRecord {
            user_id: row.get("user_id")?,
            currency: parse_column(row, "currency")?,
            amount: row.get::<_, i64>("amount")? as u64,
            updated_at: row.get::<_, i64>("updated_at")? as u64,
        })
    }

    // Synchronous helper methods for the trait implementations

    fn insert_address_sync(&self, address: &DepositAddress) -> StorageResult<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO deposit_addresses (id, user_id, currency, address, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                address.id,
                address.user_id,
                address.currency.to_string(),
                address.address,
                address.created_at as i64,
            ],
        )
        .map_err(|e| {
            if let rusqlite::Error::SqliteFailure(ref err, _) = e {
                if err.extended_code == 1555 || err.extended_code == 2067 {
                    return StorageError::Duplicate(address.address.clone());
                }
            }
            StorageError::Database(e.to_string())
        })?;

        Ok(())
    }

    fn address_owner_sync(&self, currency: Currency, address: &str) -> StorageResult<Option<String>> {
        let conn = self.conn()?;

        let owner = conn
            .query_row(
                "SELECT user_id FROM deposit_addresses WHERE currency = ?1 AND address = ?2",
                params![currency.to_string(), address],
                |row| row.get(0),
            )
            .optional()?;

        Ok(owner)
    }

    fn addresses_for_currency_sync(&self, currency: Currency) -> StorageResult<Vec<String>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare("SELECT address FROM deposit_addresses WHERE currency = ?1")?;
        let addresses = stmt
            .query_map(params![currency.to_string()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(addresses)
    }

    fn addresses_for_user_sync(&self, user_id: &str) -> StorageResult<Vec<DepositAddress>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT * FROM deposit_addresses WHERE user_id = ?1 ORDER BY created_at ASC",
        )?;
        let addresses = stmt
            .query_map(params![user_id], Self::row_to_address)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(addresses)
    }

    fn apply_observation_sync(&self, update: &LedgerUpdate) -> StorageResult<LedgerOutcome> {
        let mut conn = self.conn()?;
        // Dropping `tx` without commit rolls everything back
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = tx
            .query_row(
                "SELECT * FROM transactions WHERE currency = ?1 AND tx_hash = ?2",
                params![update.currency.to_string(), update.tx_hash],
                Self::row_to_transaction,
            )
            .optional()?;

        let outcome = match (plan_transition(existing.as_ref(), update), existing) {
            (Transition::Frozen, Some(record)) => LedgerOutcome::Unchanged(record),
            (Transition::Insert { confirm }, _) => {
                let mut record = TransactionRecord::new_deposit(update);
                if confirm {
                    record.mark_confirmed();
                }
                insert_transaction(&tx, &record)?;

                if confirm {
                    let new_balance = credit_balance(&tx, &record)?;
                    LedgerOutcome::Confirmed {
                        transaction: record,
                        new_balance,
                    }
                } else {
                    LedgerOutcome::Pending(record)
                }
            }
            (Transition::Update { confirm }, Some(mut record)) => {
                record.confirmations = update.confirmations;
                if update.block_number.is_some() {
                    record.block_number = update.block_number;
                }
                if confirm {
                    record.mark_confirmed();
                }

                let rows_affected = tx.execute(
                    r#"
                    UPDATE transactions SET
                        confirmations = ?2,
                        block_number = ?3,
                        status = ?4,
                        confirmed_at = ?5
                    WHERE id = ?1 AND status = 'pending'
                    "#,
                    params![
                        record.id,
                        record.confirmations as i64,
                        record.block_number.map(|v| v as i64),
                        record.status.to_string(),
                        record.confirmed_at.map(|v| v as i64),
                    ],
                )?;
                if rows_affected == 0 {
                    return Err(StorageError::InvalidData(format!(
                        "transaction {} left pending state mid-update",
                        record.id
                    )));
                }

                if confirm {
                    let new_balance = credit_balance(&tx, &record)?;
                    LedgerOutcome::Confirmed {
                        transaction: record,
                        new_balance,
                    }
                } else {
                    LedgerOutcome::Pending(record)
                }
            }
            (_, None) => {
                return Err(StorageError::InvalidData(format!(
                    "no row to update for {}:{}",
                    update.currency, update.tx_hash
                )))
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn pending_transactions_sync(&self) -> StorageResult<Vec<TransactionRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT * FROM transactions WHERE status = 'pending' ORDER BY created_at ASC",
        )?;
        let records = stmt
            .query_map([], Self::row_to_transaction)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn mark_failed_sync(&self, id: &str) -> StorageResult<bool> {
        let conn = self.conn()?;

        let rows_affected = conn.execute(
            "UPDATE transactions SET status = 'failed' WHERE id = ?1 AND status = 'pending'",
            params![id],
        )?;

        Ok(rows_affected > 0)
    }

    fn transaction_history_sync(
        &self,
        user_id: &str,
        currency: Option<Currency>,
    ) -> StorageResult<Vec<TransactionRecord>> {
        let conn = self.conn()?;

        let records = match currency {
            Some(currency) => {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT * FROM transactions
                    WHERE user_id = ?1 AND currency = ?2
                    ORDER BY created_at DESC, rowid DESC
                    "#,
                )?;
                let rows = stmt
                    .query_map(params![user_id, currency.to_string()], Self::row_to_transaction)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM transactions WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
                )?;
                let rows = stmt
                    .query_map(params![user_id], Self::row_to_transaction)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };

        Ok(records)
    }

    fn transaction_by_hash_sync(&self, tx_hash: &str) -> StorageResult<Option<TransactionRecord>> {
        let conn = self.conn()?;

        let record = conn
            .query_row(
                "SELECT * FROM transactions WHERE tx_hash = ?1 ORDER BY created_at ASC LIMIT 1",
                params![tx_hash],
                Self::row_to_transaction,
            )
            .optional()?;

        Ok(record)
    }

    fn balance_sync(&self, user_id: &str, currency: Currency) -> StorageResult<Option<BalanceRecord>> {
        let conn = self.conn()?;

        let balance = conn
            .query_row(
                "SELECT * FROM balances WHERE user_id = ?1 AND currency = ?2",
                params![user_id, currency.to_string()],
                Self::row_to_balance,
            )
            .optional()?;

        Ok(balance)
    }

    fn balances_sync(&self, user_id: &str) -> StorageResult<Vec<BalanceRecord>> {
        let conn = self.conn()?;

        let mut stmt =
            conn.prepare("SELECT * FROM balances WHERE user_id = ?1 ORDER BY currency ASC")?;
        let balances = stmt
            .query_map(params![user_id], Self::row_to_balance)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(balances)
    }

    fn count_by_status_sync(&self) -> StorageResult<HashMap<String, u64>> {
        let conn = self.conn()?;

        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) as count FROM transactions GROUP BY status")?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (status, count) = row?;
            counts.insert(status, count as u64);
        }

        Ok(counts)
    }
}

/// Parse a text column through `FromStr`
fn parse_column<T>(row: &rusqlite::Row, name: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(name)?;
    raw.parse().map_err(|e: String| {
        let idx = row.as_ref().column_index(name).unwrap_or(0);
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

fn insert_transaction(tx: &rusqlite::Transaction, record: &TransactionRecord) -> StorageResult<()> {
    tx.execute(
        r#"
        INSERT INTO transactions (
            id, user_id, currency, tx_type, amount, address, tx_hash,
            confirmations, status, block_number, created_at, confirmed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        params![
            record.id,
            record.user_id,
            record.currency.to_string(),
            record.tx_type.to_string(),
            record.amount as i64,
            record.address,
            record.tx_hash,
            record.confirmations as i64,
            record.status.to_string(),
            record.block_number.map(|v| v as i64),
            record.created_at as i64,
            record.confirmed_at.map(|v| v as i64),
        ],
    )?;
    Ok(())
}

/// Read-modify-write of the owner's balance inside the caller's transaction
fn credit_balance(tx: &rusqlite::Transaction, record: &TransactionRecord) -> StorageResult<u64> {
    debug_assert_eq!(record.status, TxStatus::Confirmed);

    let currency = record.currency.to_string();
    let current: u64 = tx
        .query_row(
            "SELECT amount FROM balances WHERE user_id = ?1 AND currency = ?2",
            params![record.user_id, currency],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .map(|v| v as u64)
        .unwrap_or(0);

    let new_balance = current.checked_add(record.amount).ok_or_else(|| {
        StorageError::InvalidData(format!(
            "balance overflow for {}:{}",
            record.user_id, currency
        ))
    })?;
    if new_balance > i64::MAX as u64 {
        return Err(StorageError::InvalidData(format!(
            "balance exceeds storable range for {}:{}",
            record.user_id, currency
        )));
    }

    tx.execute(
        r#"
        INSERT INTO balances (user_id, currency, amount, updated_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (user_id, currency) DO UPDATE SET
            amount = excluded.amount,
            updated_at = excluded.updated_at
        "#,
        params![record.user_id, currency, new_balance as i64, now_secs() as i64],
    )?;

    Ok(new_balance)
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn insert_address(&self, address: &DepositAddress) -> StorageResult<()> {
        self.insert_address_sync(address)
    }

    async fn address_owner(
        &self,
        currency: Currency,
        address: &str,
    ) -> StorageResult<Option<String>> {
        self.address_owner_sync(currency, address)
    }

    async fn addresses_for_currency(&self, currency: Currency) -> StorageResult<Vec<String>> {
        self.addresses_for_currency_sync(currency)
    }

    async fn addresses_for_user(&self, user_id: &str) -> StorageResult<Vec<DepositAddress>> {
        self.addresses_for_user_sync(user_id)
    }

    async fn apply_observation(&self, update: &LedgerUpdate) -> StorageResult<LedgerOutcome> {
        self.apply_observation_sync(update)
    }

    async fn pending_transactions(&self) -> StorageResult<Vec<TransactionRecord>> {
        self.pending_transactions_sync()
    }

    async fn mark_failed(&self, id: &str) -> StorageResult<bool> {
        self.mark_failed_sync(id)
    }

    async fn transaction_history(
        &self,
        user_id: &str,
        currency: Option<Currency>,
    ) -> StorageResult<Vec<TransactionRecord>> {
        self.transaction_history_sync(user_id, currency)
    }

    async fn transaction_by_hash(&self, tx_hash: &str) -> StorageResult<Option<TransactionRecord>> {
        self.transaction_by_hash_sync(tx_hash)
    }

    async fn balance(
        &self,
        user_id: &str,
        currency: Currency,
    ) -> StorageResult<Option<BalanceRecord>> {
        self.balance_sync(user_id, currency)
    }

    async fn balances(&self, user_id: &str) -> StorageResult<Vec<BalanceRecord>> {
        self.balances_sync(user_id)
    }

    async fn count_by_status(&self) -> StorageResult<HashMap<String, u64>> {
        self.count_by_status_sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(tx_hash: &str, confirmations: u32) -> LedgerUpdate {
        LedgerUpdate {
            user_id: "user-1".to_string(),
            currency: Currency::Btc,
            tx_hash: tx_hash.to_string(),
            amount: 1_000_000,
            address: "bc1qdeposit".to_string(),
            confirmations,
            block_number: Some(800_000),
            required_confirmations: 6,
        }
    }

    #[tokio::test]
    async fn test_insert_and_resolve_address() {
        let store = SqliteLedgerStore::in_memory().unwrap();
        let addr = DepositAddress::new("user-1".to_string(), Currency::Btc, "bc1qdeposit");

        store.insert_address(&addr).await.unwrap();

        let owner = store.address_owner(Currency::Btc, "bc1qdeposit").await.unwrap();
        assert_eq!(owner, Some("user-1".to_string()));
        assert_eq!(store.address_owner(Currency::Eth, "bc1qdeposit").await.unwrap(), None);

        let all = store.addresses_for_currency(Currency::Btc).await.unwrap();
        assert_eq!(all, vec!["bc1qdeposit".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_address() {
        let store = SqliteLedgerStore::in_memory().unwrap();

        let first = DepositAddress::new("user-1".to_string(), Currency::Btc, "bc1qsame");
        let second = DepositAddress::new("user-2".to_string(), Currency::Btc, "bc1qsame");

        store.insert_address(&first).await.unwrap();
        let result = store.insert_address(&second).await;

        assert!(matches!(result, Err(StorageError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_pending_then_confirmed_credits_once() {
        let store = SqliteLedgerStore::in_memory().unwrap();

        let outcome = store.apply_observation(&update("tx1", 0)).await.unwrap();
        assert!(matches!(outcome, LedgerOutcome::Pending(ref r) if r.confirmations == 0));
        assert_eq!(store.balance("user-1", Currency::Btc).await.unwrap(), None);

        let outcome = store.apply_observation(&update("tx1", 6)).await.unwrap();
        match outcome {
            LedgerOutcome::Confirmed { transaction, new_balance } => {
                assert_eq!(transaction.status, TxStatus::Confirmed);
                assert!(transaction.confirmed_at.is_some());
                assert_eq!(new_balance, 1_000_000);
            }
            other => panic!("expected confirmation, got {:?}", other),
        }

        // Duplicate and regressing observations are no-ops
        let again = store.apply_observation(&update("tx1", 6)).await.unwrap();
        assert!(matches!(again, LedgerOutcome::Unchanged(_)));
        let lower = store.apply_observation(&update("tx1", 2)).await.unwrap();
        assert!(matches!(lower, LedgerOutcome::Unchanged(ref r) if r.confirmations == 6));

        let balance = store.balance("user-1", Currency::Btc).await.unwrap().unwrap();
        assert_eq!(balance.amount, 1_000_000);
    }

    #[tokio::test]
    async fn test_confirmed_on_first_sight() {
        let store = SqliteLedgerStore::in_memory().unwrap();

        store.apply_observation(&update("tx1", 10)).await.unwrap();
        store.apply_observation(&update("tx2", 7)).await.unwrap();

        let balance = store.balance("user-1", Currency::Btc).await.unwrap().unwrap();
        assert_eq!(balance.amount, 2_000_000);
        assert!(store.pending_transactions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_balances_lists_each_currency() {
        let store = SqliteLedgerStore::in_memory().unwrap();
        assert!(store.balances("user-1").await.unwrap().is_empty());

        let mut eth = update("0xeth", 12);
        eth.currency = Currency::Eth;
        eth.required_confirmations = 12;
        store.apply_observation(&eth).await.unwrap();
        store.apply_observation(&update("tx1", 6)).await.unwrap();

        let balances = store.balances("user-1").await.unwrap();
        let currencies: Vec<Currency> = balances.iter().map(|b| b.currency).collect();
        assert_eq!(currencies, vec![Currency::Btc, Currency::Eth]);
        assert!(store.balances("user-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_balance_write_rolls_back_status() {
        let store = SqliteLedgerStore::in_memory().unwrap();
        store.apply_observation(&update("tx1", 1)).await.unwrap();

        store.conn().unwrap().execute_batch("DROP TABLE balances").unwrap();

        let result = store.apply_observation(&update("tx1", 6)).await;
        assert!(result.is_err());

        let record = store.transaction_by_hash("tx1").await.unwrap().unwrap();
        assert_eq!(record.status, TxStatus::Pending);
        assert_eq!(record.confirmations, 1);
        assert!(record.confirmed_at.is_none());
    }

    #[tokio::test]
    async fn test_mark_failed_only_from_pending() {
        let store = SqliteLedgerStore::in_memory().unwrap();

        let pending = match store.apply_observation(&update("tx1", 0)).await.unwrap() {
            LedgerOutcome::Pending(r) => r,
            other => panic!("unexpected {:?}", other),
        };
        assert!(store.mark_failed(&pending.id).await.unwrap());
        assert!(!store.mark_failed(&pending.id).await.unwrap());

        // A failed row ignores later observations
        let outcome = store.apply_observation(&update("tx1", 9)).await.unwrap();
        assert!(matches!(outcome, LedgerOutcome::Unchanged(ref r) if r.status == TxStatus::Failed));
        assert_eq!(store.balance("user-1", Currency::Btc).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_history_filters_and_counts() {
        let store = SqliteLedgerStore::in_memory().unwrap();

        store.apply_observation(&update("tx1", 0)).await.unwrap();
        store.apply_observation(&update("tx2", 6)).await.unwrap();
        let mut eth = update("0xeth", 0);
        eth.currency = Currency::Eth;
        store.apply_observation(&eth).await.unwrap();

        let all = store.transaction_history("user-1", None).await.unwrap();
        assert_eq!(all.len(), 3);
        let btc = store
            .transaction_history("user-1", Some(Currency::Btc))
            .await
            .unwrap();
        assert_eq!(btc.len(), 2);
        assert!(store.transaction_history("nobody", None).await.unwrap().is_empty());

        let counts = store.count_by_status().await.unwrap();
        assert_eq!(counts.get("pending"), Some(&2));
        assert_eq!(counts.get("confirmed"), Some(&1));
    }
}
