//! Bitcoin-style block poller
//!
//! Each tick scans every block between the stored cursor and the chain tip.
//! The first run only records the tip; history before it is not scanned.
//! A hash mismatch at the cursor means the chain reorganized under us and
//! the scan restarts `reorg_depth` blocks earlier.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{read_cursor, write_cursor, TickGuard, WatcherError, BLOCK_HASH_TTL};
use crate::chain::ChainRpc;
use crate::common::logging::log_chain_event;
use crate::directory::AddressDirectory;
use crate::processor::DepositProcessor;
use crate::scheduler::PeriodicTask;
use crate::storage::{keys, KvStore};
use crate::types::{Currency, Observation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollReport {
    /// Previous tick still running
    Skipped,
    /// First run: cursor set to the tip
    Baseline { height: u64 },
    NoNewBlocks { height: u64 },
    Scanned {
        from: u64,
        to: u64,
        observations: usize,
        reorg: bool,
    },
}

pub struct BitcoinPoller {
    currency: Currency,
    chain: Arc<dyn ChainRpc>,
    directory: Arc<AddressDirectory>,
    processor: Arc<DepositProcessor>,
    kv: Arc<dyn KvStore>,
    reorg_depth: u64,
    guard: TickGuard,
}

impl BitcoinPoller {
    pub fn new(
        currency: Currency,
        chain: Arc<dyn ChainRpc>,
        directory: Arc<AddressDirectory>,
        processor: Arc<DepositProcessor>,
        kv: Arc<dyn KvStore>,
        reorg_depth: u64,
    ) -> Self {
        Self {
            currency,
            chain,
            directory,
            processor,
            kv,
            reorg_depth,
            guard: TickGuard::default(),
        }
    }

    pub async fn poll_once(&self) -> Result<PollReport, WatcherError> {
        let Some(_permit) = self.guard.try_enter() else {
            return Ok(PollReport::Skipped);
        };

        let currency = self.currency;
        let cursor_key = keys::last_block_height(currency);
        let tip = self.chain.height().await?;

        let Some(last) = read_cursor(self.kv.as_ref(), &cursor_key).await? else {
            let hash = self.chain.block_hash(tip).await?;
            self.remember_hash(tip, &hash).await?;
            write_cursor(self.kv.as_ref(), &cursor_key, tip).await?;
            info!(currency = %currency, height = tip, "Block poller baseline recorded");
            return Ok(PollReport::Baseline { height: tip });
        };

        if tip <= last {
            return Ok(PollReport::NoNewBlocks { height: tip });
        }

        let reorg = self.reorged_at(last).await?;
        let start = if reorg {
            let start = last.saturating_sub(self.reorg_depth);
            log_chain_event(
                "reorg_detected",
                currency,
                false,
                serde_json::json!({ "cursor": last, "rescan_from": start + 1 }),
            );
            start
        } else {
            last
        };

        let watched = self.directory.addresses_for_currency(currency).await?;
        let mut observations = 0;

        for height in (start + 1)..=tip {
            let hash = self.chain.block_hash(height).await?;
            self.remember_hash(height, &hash).await?;

            if watched.is_empty() {
                continue;
            }

            let block = self.chain.block(&hash).await?;
            for payment in block.payments_to(&watched) {
                let observation = Observation::new(
                    currency,
                    payment.txid,
                    payment.amount,
                    &payment.address,
                    block.confirmations,
                )
                .at_height(height);

                let outcome = self.processor.handle_observation(&observation).await?;
                debug!(
                    currency = %currency,
                    tx_hash = %observation.tx_hash,
                    height,
                    outcome = outcome.label(),
                    "Block observation processed"
                );
                observations += 1;
            }
        }

        write_cursor(self.kv.as_ref(), &cursor_key, tip).await?;

        Ok(PollReport::Scanned {
            from: start + 1,
            to: tip,
            observations,
            reorg,
        })
    }

    /// Whether the block we last scanned is no longer on the best chain
    async fn reorged_at(&self, height: u64) -> Result<bool, WatcherError> {
        let key = keys::block_hash(self.currency, height);
        let Some(stored) = self.kv.get(&key).await? else {
            return Ok(false);
        };
        let current = self.chain.block_hash(height).await?;
        Ok(current != stored)
    }

    async fn remember_hash(&self, height: u64, hash: &str) -> Result<(), WatcherError> {
        self.kv
            .set(&keys::block_hash(self.currency, height), hash, Some(BLOCK_HASH_TTL))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PeriodicTask for BitcoinPoller {
    fn name(&self) -> &'static str {
        "bitcoin-poller"
    }

    async fn tick(&self) {
        match self.poll_once().await {
            Ok(PollReport::Scanned {
                from,
                to,
                observations,
                reorg,
            }) => info!(
                currency = %self.currency,
                from,
                to,
                observations,
                reorg,
                "Scanned blocks"
            ),
            Ok(PollReport::Skipped) => debug!(currency = %self.currency, "Previous poll still running"),
            Ok(_) => {}
            Err(e) => warn!(currency = %self.currency, error = %e, "Block poll failed, will retry"),
        }
    }
}
