//! Confirmation Monitor
//!
//! Periodically walks every pending deposit, asks its chain for a fresh
//! confirmation count and feeds changes back into the processor. A deposit
//! that has sat at zero confirmations for longer than `stale_after` is
//! retired as failed and never polled again.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::chain::ChainClients;
use crate::common::logging::log_deposit_event;
use crate::processor::DepositProcessor;
use crate::scheduler::PeriodicTask;
use crate::storage::{keys, KvStore, LedgerStore};
use crate::types::{now_secs, Observation, TransactionRecord};
use crate::watcher::{TickGuard, WatcherError};

/// Default window after which an unconfirmed deposit is considered dropped
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub checked: usize,
    pub resubmitted: usize,
    pub failed: usize,
    pub errors: usize,
}

enum Check {
    Unchanged,
    Resubmitted,
    Failed,
}

pub struct ConfirmationMonitor {
    ledger: Arc<dyn LedgerStore>,
    chains: ChainClients,
    processor: Arc<DepositProcessor>,
    kv: Arc<dyn KvStore>,
    stale_after: Duration,
    guard: TickGuard,
}

impl ConfirmationMonitor {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        chains: ChainClients,
        processor: Arc<DepositProcessor>,
        kv: Arc<dyn KvStore>,
        stale_after: Duration,
    ) -> Self {
        Self {
            ledger,
            chains,
            processor,
            kv,
            stale_after,
            guard: TickGuard::default(),
        }
    }

    /// One pass over the pending set. Returns `None` if a pass is already
    /// running.
    pub async fn tick_once(&self) -> Result<Option<MonitorReport>, WatcherError> {
        let Some(_permit) = self.guard.try_enter() else {
            return Ok(None);
        };
        self.check_pending(now_secs()).await.map(Some)
    }

    /// Check every pending row as of `now` (unix seconds)
    pub async fn check_pending(&self, now: u64) -> Result<MonitorReport, WatcherError> {
        let pending = self.ledger.pending_transactions().await?;
        let mut report = MonitorReport::default();

        for record in &pending {
            report.checked += 1;
            match self.check_one(record, now).await {
                Ok(Check::Unchanged) => {}
                Ok(Check::Resubmitted) => report.resubmitted += 1,
                Ok(Check::Failed) => report.failed += 1,
                Err(e) => {
                    warn!(
                        currency = %record.currency,
                        tx_hash = %record.tx_hash,
                        error = %e,
                        "Pending deposit check failed"
                    );
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    async fn check_one(&self, record: &TransactionRecord, now: u64) -> Result<Check, WatcherError> {
        let Some(chain) = self.chains.get(&record.currency) else {
            debug!(currency = %record.currency, "No chain client for pending deposit");
            return Ok(Check::Unchanged);
        };

        let confirmations = chain.confirmations_of(&record.tx_hash).await?;

        if confirmations == 0 && record.age_secs(now) > self.stale_after.as_secs() {
            return self.retire(record).await;
        }

        if confirmations == record.confirmations {
            return Ok(Check::Unchanged);
        }

        let mut observation = Observation::new(
            record.currency,
            record.tx_hash.as_str(),
            record.amount,
            &record.address,
            confirmations,
        );
        if let Some(block) = record.block_number {
            observation = observation.at_height(block);
        }

        let outcome = self.processor.handle_observation(&observation).await?;
        debug!(
            tx_hash = %record.tx_hash,
            confirmations,
            outcome = outcome.label(),
            "Pending deposit resubmitted"
        );
        Ok(Check::Resubmitted)
    }

    async fn retire(&self, record: &TransactionRecord) -> Result<Check, WatcherError> {
        if !self.ledger.mark_failed(&record.id).await? {
            // Confirmed or failed by someone else in the meantime
            return Ok(Check::Unchanged);
        }

        let pending_key = keys::deposit_pending(record.currency, &record.tx_hash);
        if let Err(e) = self.kv.delete(&pending_key).await {
            warn!(key = %pending_key, error = %e, "Failed to drop pending marker");
        }

        warn!(
            currency = %record.currency,
            tx_hash = %record.tx_hash,
            user_id = %record.user_id,
            stale_after_secs = self.stale_after.as_secs(),
            "Deposit never confirmed, marked failed"
        );
        log_deposit_event(
            "deposit_failed",
            record.currency,
            &record.tx_hash,
            record.amount,
            false,
            Some("stale"),
        );
        Ok(Check::Failed)
    }
}

#[async_trait]
impl PeriodicTask for ConfirmationMonitor {
    fn name(&self) -> &'static str {
        "confirmation-monitor"
    }

    async fn tick(&self) {
        match self.tick_once().await {
            Ok(Some(report)) if report.checked > 0 => info!(
                checked = report.checked,
                resubmitted = report.resubmitted,
                failed = report.failed,
                errors = report.errors,
                "Confirmation check finished"
            ),
            Ok(Some(_)) => {}
            Ok(None) => debug!("Previous confirmation check still running"),
            Err(e) => warn!(error = %e, "Confirmation check failed, will retry"),
        }
    }
}
