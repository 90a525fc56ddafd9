//! SQLite-backed KV store
//!
//! Same contract as [`MemoryKvStore`](super::memory::MemoryKvStore) but
//! survives restarts, so watcher cursors and processed markers are kept
//! across deploys. Expiry is stored as unix milliseconds and checked on read.

use async_trait::async_trait;
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use std::time::Duration;

use super::sqlite::{memory_pool, SqlitePool};
use super::traits::{KvStore, StorageError, StorageResult};

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn expiry(ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|t| now_millis().saturating_add(t.as_millis().min(i64::MAX as u128) as i64))
}

#[derive(Clone)]
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    /// Share a pool with the ledger store
    pub fn from_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        let store = Self { pool };
        store.run_migrations()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::from_pool(memory_pool()?)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_kv_expires ON kv(expires_at);
            "#,
        )?;
        Ok(())
    }

    /// Delete expired rows; returns how many were removed
    pub fn purge_expired(&self) -> StorageResult<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![now_millis()],
        )?;
        Ok(removed)
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                r#"
                SELECT value FROM kv
                WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)
                "#,
                params![key, now_millis()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
            ON CONFLICT (key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            "#,
            params![key, value, expiry(ttl)],
        )?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Overwrite only a dead row
        let written = tx.execute(
            r#"
            INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
            ON CONFLICT (key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            WHERE kv.expires_at IS NOT NULL AND kv.expires_at <= ?4
            "#,
            params![key, value, expiry(Some(ttl)), now_millis()],
        )?;

        tx.commit()?;
        Ok(written > 0)
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let live = conn.execute(
            "DELETE FROM kv WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
            params![key, now_millis()],
        )?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(live > 0)
    }

    async fn delete_if_value(&self, key: &str, value: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            r#"
            DELETE FROM kv
            WHERE key = ?1 AND value = ?2 AND (expires_at IS NULL OR expires_at > ?3)
            "#,
            params![key, value, now_millis()],
        )?;
        Ok(removed > 0)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let conn = self.conn()?;
        // substr comparison sidesteps LIKE wildcards in keys
        let mut stmt = conn.prepare(
            r#"
            SELECT key FROM kv
            WHERE substr(key, 1, length(?1)) = ?1
              AND (expires_at IS NULL OR expires_at > ?2)
            ORDER BY key ASC
            "#,
        )?;
        let keys = stmt
            .query_map(params![prefix, now_millis()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }
}
