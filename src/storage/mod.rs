//! Storage Layer Module
//!
//! Provides persistence for the deposit ledger and the lock/cache store.
//!
//! This module contains:
//! - Storage trait definitions for abstraction
//! - SQLite implementations for production
//! - In-memory KV implementation for testing
//! - The KV key layout shared by every component

pub mod keys;
pub mod memory;
pub mod sqlite;
pub mod sqlite_kv;
pub mod traits;

// Re-exports for convenience
pub use memory::MemoryKvStore;
pub use sqlite::{memory_pool, open_pool, SqliteLedgerStore, SqlitePool};
pub use sqlite_kv::SqliteKvStore;
pub use traits::{KvStore, LedgerStore, StorageError, StorageResult};
