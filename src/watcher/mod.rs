//! Chain Watchers
//!
//! Producers that turn chain data into observations:
//! - `BitcoinPoller` - block-height polling with hash-based reorg detection
//! - `EthereumWatcher` - live head handling plus a per-address sweep
//! - `subscription` - the WebSocket `newHeads` feed driving `EthereumWatcher`

pub mod bitcoin;
pub mod ethereum;
pub mod subscription;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

use crate::chain::ChainError;
use crate::directory::DirectoryError;
use crate::processor::ProcessorError;
use crate::storage::{KvStore, StorageError};

pub use bitcoin::{BitcoinPoller, PollReport};
pub use ethereum::{EthereumWatcher, HeadReport, ReorgReport, SweepReport};

/// Lifetime of stored block hashes used for reorg checks
pub const BLOCK_HASH_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Processor error: {0}")]
    Processor(#[from] ProcessorError),

    #[error("Corrupt cursor {key}: {value:?}")]
    CorruptCursor { key: String, value: String },
}

/// Non-blocking busy flag; a second concurrent tick is skipped
#[derive(Debug, Default)]
pub struct TickGuard {
    busy: AtomicBool,
}

pub struct TickPermit<'a> {
    busy: &'a AtomicBool,
}

impl TickGuard {
    pub fn try_enter(&self) -> Option<TickPermit<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickPermit { busy: &self.busy })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for TickPermit<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Read a numeric cursor from the KV store
pub(crate) async fn read_cursor(kv: &dyn KvStore, key: &str) -> Result<Option<u64>, WatcherError> {
    match kv.get(key).await? {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| WatcherError::CorruptCursor {
                key: key.to_string(),
                value: raw,
            }),
    }
}

pub(crate) async fn write_cursor(kv: &dyn KvStore, key: &str, value: u64) -> Result<(), WatcherError> {
    kv.set(key, &value.to_string(), None).await?;
    Ok(())
}
