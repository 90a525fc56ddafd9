//! Deposit Processor
//!
//! The single write entry point for deposit state. Every producer (block
//! poller, head subscription, sweep, confirmation monitor) funnels into
//! [`DepositProcessor::handle_observation`], which:
//!
//! 1. short-circuits on the processed marker
//! 2. takes the per-transaction lock (or reports contention)
//! 3. re-checks the marker under the lock
//! 4. resolves the owner and applies the ledger step atomically
//! 5. writes markers and notifies after commit
//!
//! Confirmed deposits are credited exactly once: the processed marker is a
//! fast path, the ledger's refusal to modify terminal rows is the guarantee.

pub mod lock;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::common::logging::log_deposit_event;
use crate::directory::{AddressDirectory, DirectoryError};
use crate::notify::{ConfirmedNotice, DepositEvent, NotificationSink, PendingNotice};
use crate::storage::{keys, KvStore, LedgerStore, StorageError};
use crate::types::{
    BalanceRecord, Currency, LedgerOutcome, LedgerUpdate, Observation, PendingDeposit,
    TransactionRecord, TxStatus,
};

pub use lock::LockGuard;

/// Processed markers outlive any realistic redelivery window
pub const PROCESSED_MARKER_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
pub const PENDING_MARKER_TTL: Duration = Duration::from_secs(48 * 60 * 60);
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),
}

/// Confirmations required before a deposit is credited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub btc: u32,
    pub eth: u32,
}

impl ConfirmationPolicy {
    pub fn new(btc: u32, eth: u32) -> Self {
        Self { btc, eth }
    }

    pub fn required(&self, currency: Currency) -> u32 {
        match currency {
            Currency::Btc => self.btc,
            Currency::Eth => self.eth,
        }
    }
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self { btc: 6, eth: 12 }
    }
}

/// What happened to one observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservationOutcome {
    /// Processed marker present; nothing touched
    AlreadyProcessed,
    /// Another worker holds the lock; the observation will come again
    Contended,
    /// Address is not assigned to anyone; dropped
    UnknownAddress,
    Pending {
        transaction: TransactionRecord,
        required: u32,
    },
    Confirmed {
        transaction: TransactionRecord,
        new_balance: u64,
    },
    /// Row already terminal
    Unchanged(TransactionRecord),
}

impl ObservationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ObservationOutcome::AlreadyProcessed => "already_processed",
            ObservationOutcome::Contended => "contended",
            ObservationOutcome::UnknownAddress => "unknown_address",
            ObservationOutcome::Pending { .. } => "pending",
            ObservationOutcome::Confirmed { .. } => "confirmed",
            ObservationOutcome::Unchanged(_) => "unchanged",
        }
    }
}

pub struct DepositProcessor {
    directory: Arc<AddressDirectory>,
    ledger: Arc<dyn LedgerStore>,
    kv: Arc<dyn KvStore>,
    sink: Arc<dyn NotificationSink>,
    policy: ConfirmationPolicy,
    lock_ttl: Duration,
}

impl DepositProcessor {
    pub fn new(
        directory: Arc<AddressDirectory>,
        ledger: Arc<dyn LedgerStore>,
        kv: Arc<dyn KvStore>,
        sink: Arc<dyn NotificationSink>,
        policy: ConfirmationPolicy,
    ) -> Self {
        Self {
            directory,
            ledger,
            kv,
            sink,
            policy,
            lock_ttl: DEFAULT_LOCK_TTL,
        }
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    pub fn policy(&self) -> ConfirmationPolicy {
        self.policy
    }

    /// Apply one chain observation. Safe to call any number of times, from
    /// any number of tasks, with the same observation.
    pub async fn handle_observation(
        &self,
        observation: &Observation,
    ) -> Result<ObservationOutcome, ProcessorError> {
        let currency = observation.currency;
        let tx_hash = observation.tx_hash.as_str();
        let processed_key = keys::deposit_processed(currency, tx_hash);

        if self.kv.get(&processed_key).await?.is_some() {
            debug!(currency = %currency, tx_hash = %tx_hash, "Deposit already processed");
            return Ok(ObservationOutcome::AlreadyProcessed);
        }

        let lock_key = keys::deposit_lock(currency, tx_hash);
        let Some(guard) = LockGuard::acquire(self.kv.clone(), lock_key, self.lock_ttl).await? else {
            debug!(currency = %currency, tx_hash = %tx_hash, "Deposit locked by another worker");
            return Ok(ObservationOutcome::Contended);
        };

        let result = self.process_locked(observation, &processed_key).await;

        match guard.release().await {
            Ok(true) => {}
            Ok(false) => warn!(
                currency = %currency,
                tx_hash = %tx_hash,
                "Processing lock expired before release"
            ),
            Err(e) => warn!(currency = %currency, tx_hash = %tx_hash, error = %e, "Failed to release lock"),
        }

        if let Err(e) = &result {
            log_deposit_event(
                "observation_failed",
                currency,
                tx_hash,
                observation.amount,
                false,
                Some(&e.to_string()),
            );
        }
        result
    }

    async fn process_locked(
        &self,
        observation: &Observation,
        processed_key: &str,
    ) -> Result<ObservationOutcome, ProcessorError> {
        let currency = observation.currency;
        let tx_hash = observation.tx_hash.as_str();

        if self.kv.get(processed_key).await?.is_some() {
            return Ok(ObservationOutcome::AlreadyProcessed);
        }

        let Some(user_id) = self
            .directory
            .resolve_owner(currency, &observation.address)
            .await?
        else {
            warn!(
                currency = %currency,
                tx_hash = %tx_hash,
                address = %observation.address,
                "Observation for unassigned address dropped"
            );
            return Ok(ObservationOutcome::UnknownAddress);
        };

        let required = self.policy.required(currency);
        let update = LedgerUpdate::from_observation(observation, user_id, required);
        let outcome = self.ledger.apply_observation(&update).await?;
        let pending_key = keys::deposit_pending(currency, tx_hash);

        match outcome {
            LedgerOutcome::Confirmed {
                transaction,
                new_balance,
            } => {
                self.write_marker(processed_key, &transaction.id, Some(PROCESSED_MARKER_TTL))
                    .await;
                self.drop_marker(&pending_key).await;

                log_deposit_event(
                    "deposit_confirmed",
                    currency,
                    tx_hash,
                    transaction.amount,
                    true,
                    None,
                );
                self.sink.notify(
                    &transaction.user_id,
                    DepositEvent::DepositConfirmed(ConfirmedNotice {
                        tx_hash: transaction.tx_hash.clone(),
                        currency,
                        amount: transaction.amount,
                        new_balance,
                    }),
                );

                Ok(ObservationOutcome::Confirmed {
                    transaction,
                    new_balance,
                })
            }
            LedgerOutcome::Pending(transaction) => {
                let marker = PendingDeposit {
                    amount: transaction.amount,
                    address: transaction.address.clone(),
                    block_number: transaction.block_number,
                };
                match serde_json::to_string(&marker) {
                    Ok(json) => self.write_marker(&pending_key, &json, Some(PENDING_MARKER_TTL)).await,
                    Err(e) => warn!(key = %pending_key, error = %e, "Failed to encode pending marker"),
                }

                debug!(
                    currency = %currency,
                    tx_hash = %tx_hash,
                    confirmations = transaction.confirmations,
                    required,
                    "Deposit pending"
                );
                self.sink.notify(
                    &transaction.user_id,
                    DepositEvent::DepositPending(PendingNotice {
                        tx_hash: transaction.tx_hash.clone(),
                        currency,
                        amount: transaction.amount,
                        confirmations: transaction.confirmations,
                        required,
                    }),
                );

                Ok(ObservationOutcome::Pending {
                    transaction,
                    required,
                })
            }
            LedgerOutcome::Unchanged(transaction) => {
                // Markers may have been lost after an earlier commit
                if transaction.status == TxStatus::Confirmed {
                    self.write_marker(processed_key, &transaction.id, Some(PROCESSED_MARKER_TTL))
                        .await;
                }
                self.drop_marker(&pending_key).await;
                Ok(ObservationOutcome::Unchanged(transaction))
            }
        }
    }

    async fn write_marker(&self, key: &str, value: &str, ttl: Option<Duration>) {
        if let Err(e) = self.kv.set(key, value, ttl).await {
            warn!(key = %key, error = %e, "Failed to write marker after commit");
        }
    }

    async fn drop_marker(&self, key: &str) {
        if let Err(e) = self.kv.delete(key).await {
            warn!(key = %key, error = %e, "Failed to delete marker after commit");
        }
    }

    pub async fn transaction_history(
        &self,
        user_id: &str,
        currency: Option<Currency>,
    ) -> Result<Vec<TransactionRecord>, ProcessorError> {
        Ok(self.ledger.transaction_history(user_id, currency).await?)
    }

    pub async fn transaction_by_hash(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TransactionRecord>, ProcessorError> {
        Ok(self.ledger.transaction_by_hash(tx_hash).await?)
    }

    pub async fn balance(
        &self,
        user_id: &str,
        currency: Currency,
    ) -> Result<Option<BalanceRecord>, ProcessorError> {
        Ok(self.ledger.balance(user_id, currency).await?)
    }

    /// One entry per supported currency; missing rows read as zero
    pub async fn balances(&self, user_id: &str) -> Result<Vec<BalanceRecord>, ProcessorError> {
        let stored = self.ledger.balances(user_id).await?;
        Ok(Currency::ALL
            .iter()
            .map(|currency| {
                stored
                    .iter()
                    .find(|b| b.currency == *currency)
                    .cloned()
                    .unwrap_or_else(|| BalanceRecord {
                        user_id: user_id.to_string(),
                        currency: *currency,
                        amount: 0,
                        updated_at: 0,
                    })
            })
            .collect())
    }

    pub async fn count_by_status(&self) -> Result<HashMap<String, u64>, ProcessorError> {
        Ok(self.ledger.count_by_status().await?)
    }
}
