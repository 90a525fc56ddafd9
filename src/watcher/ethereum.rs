//! Ethereum-style watcher
//!
//! Two paths feed the processor:
//! - live: every new head refreshes the confirmation count of each pending
//!   deposit from its recorded block number
//! - sweep: a periodic per-address scan over a bounded block window that
//!   catches anything the live path never saw
//!
//! Both check stored block hashes. On a mismatch the reorg policy
//! revalidates pending deposits at or above the fork point and rewinds
//! sweep cursors so the affected blocks are scanned again. Confirmed
//! deposits are final.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{read_cursor, write_cursor, TickGuard, WatcherError, BLOCK_HASH_TTL};
use crate::chain::{confirmations_at, BlockHead, ChainRpc, Payment};
use crate::common::logging::log_chain_event;
use crate::directory::AddressDirectory;
use crate::processor::{DepositProcessor, PENDING_MARKER_TTL};
use crate::scheduler::PeriodicTask;
use crate::storage::{keys, KvStore};
use crate::types::{Currency, Observation, PendingDeposit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthereumSettings {
    pub reorg_depth: u64,
    pub sweep_window: u64,
    pub initial_lookback: u64,
}

impl Default for EthereumSettings {
    fn default() -> Self {
        Self {
            reorg_depth: 12,
            sweep_window: 100,
            initial_lookback: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReorgReport {
    pub fork_point: u64,
    pub revalidated: usize,
    pub cursors_rewound: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadReport {
    pub reorg: Option<ReorgReport>,
    pub resubmitted: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepReport {
    Skipped,
    Swept {
        addresses: usize,
        blocks_fetched: usize,
        observations: usize,
        failures: usize,
        reorg: Option<ReorgReport>,
    },
}

/// Blocks fetched during one sweep, shared by every address
struct ScannedBlock {
    confirmations: u32,
    payments: Vec<Payment>,
}

pub struct EthereumWatcher {
    currency: Currency,
    chain: Arc<dyn ChainRpc>,
    directory: Arc<AddressDirectory>,
    processor: Arc<DepositProcessor>,
    kv: Arc<dyn KvStore>,
    settings: EthereumSettings,
    sweep_guard: TickGuard,
}

impl EthereumWatcher {
    pub fn new(
        currency: Currency,
        chain: Arc<dyn ChainRpc>,
        directory: Arc<AddressDirectory>,
        processor: Arc<DepositProcessor>,
        kv: Arc<dyn KvStore>,
        settings: EthereumSettings,
    ) -> Self {
        Self {
            currency,
            chain,
            directory,
            processor,
            kv,
            settings,
            sweep_guard: TickGuard::default(),
        }
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    // ------------------------------------------------------------------
    // Live path
    // ------------------------------------------------------------------

    pub async fn on_new_head(&self, head: &BlockHead) -> Result<HeadReport, WatcherError> {
        let mut report = HeadReport::default();

        if self.head_conflicts(head).await? {
            let fork_point = head.number.saturating_sub(self.settings.reorg_depth);
            report.reorg = Some(self.handle_reorg(fork_point).await?);
        }

        self.remember_hash(head.number, &head.hash).await?;

        for (tx_hash, marker) in self.pending_markers().await? {
            let confirmations = match marker.block_number {
                Some(block) => confirmations_at(head.number, block),
                None => match self.chain.confirmations_of(&tx_hash).await {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(tx_hash = %tx_hash, error = %e, "Confirmation lookup failed");
                        report.errors += 1;
                        continue;
                    }
                },
            };

            let mut observation = Observation::new(
                self.currency,
                tx_hash.as_str(),
                marker.amount,
                &marker.address,
                confirmations,
            );
            if let Some(block) = marker.block_number {
                observation = observation.at_height(block);
            }

            match self.processor.handle_observation(&observation).await {
                Ok(_) => report.resubmitted += 1,
                Err(e) => {
                    warn!(tx_hash = %tx_hash, error = %e, "Head resubmission failed");
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    /// The head does not extend the chain we recorded
    async fn head_conflicts(&self, head: &BlockHead) -> Result<bool, WatcherError> {
        if head.number > 0 {
            let parent_key = keys::block_hash(self.currency, head.number - 1);
            if let Some(parent) = self.kv.get(&parent_key).await? {
                if parent != head.parent_hash {
                    return Ok(true);
                }
            }
        }

        let own_key = keys::block_hash(self.currency, head.number);
        Ok(matches!(self.kv.get(&own_key).await?, Some(stored) if stored != head.hash))
    }

    // ------------------------------------------------------------------
    // Reorg policy
    // ------------------------------------------------------------------

    /// Revalidate pending deposits mined at or after `fork_point` and rewind
    /// every sweep cursor to just before it.
    pub async fn handle_reorg(&self, fork_point: u64) -> Result<ReorgReport, WatcherError> {
        let mut report = ReorgReport {
            fork_point,
            ..ReorgReport::default()
        };
        let tip = self.chain.height().await?;

        for (tx_hash, marker) in self.pending_markers().await? {
            if marker.block_number.is_some_and(|b| b < fork_point) {
                continue;
            }

            let confirmations = self.chain.confirmations_of(&tx_hash).await?;
            let mut observation = Observation::new(
                self.currency,
                tx_hash.as_str(),
                marker.amount,
                &marker.address,
                confirmations,
            );
            if confirmations > 0 {
                observation = observation.at_height(tip + 1 - u64::from(confirmations).min(tip + 1));
            }
            self.processor.handle_observation(&observation).await?;

            if confirmations == 0 {
                // Back in the mempool (or gone): forget the old block
                self.forget_block(&tx_hash, &marker).await?;
            }
            report.revalidated += 1;
        }

        let rewind_to = fork_point.saturating_sub(1);
        let prefix = keys::last_scanned_prefix(self.currency);
        for key in self.kv.keys_with_prefix(&prefix).await? {
            match read_cursor(self.kv.as_ref(), &key).await {
                Ok(Some(cursor)) if cursor > rewind_to => {
                    write_cursor(self.kv.as_ref(), &key, rewind_to).await?;
                    report.cursors_rewound += 1;
                }
                Ok(_) => {}
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable sweep cursor"),
            }
        }

        log_chain_event(
            "reorg_handled",
            self.currency,
            false,
            serde_json::json!({
                "fork_point": fork_point,
                "tip": tip,
                "revalidated": report.revalidated,
                "cursors_rewound": report.cursors_rewound
            }),
        );

        Ok(report)
    }

    async fn forget_block(&self, tx_hash: &str, marker: &PendingDeposit) -> Result<(), WatcherError> {
        let key = keys::deposit_pending(self.currency, tx_hash);
        // Only while still pending; a confirmation would have removed it
        if self.kv.get(&key).await?.is_none() {
            return Ok(());
        }
        let unmined = PendingDeposit {
            block_number: None,
            ..marker.clone()
        };
        if let Ok(json) = serde_json::to_string(&unmined) {
            self.kv.set(&key, &json, Some(PENDING_MARKER_TTL)).await?;
        }
        Ok(())
    }

    async fn pending_markers(&self) -> Result<Vec<(String, PendingDeposit)>, WatcherError> {
        let prefix = keys::deposit_pending_prefix(self.currency);
        let mut markers = Vec::new();

        for key in self.kv.keys_with_prefix(&prefix).await? {
            let Some(raw) = self.kv.get(&key).await? else {
                continue;
            };
            let tx_hash = key[prefix.len()..].to_string();
            match serde_json::from_str::<PendingDeposit>(&raw) {
                Ok(marker) => markers.push((tx_hash, marker)),
                Err(e) => warn!(key = %key, error = %e, "Ignoring malformed pending marker"),
            }
        }

        Ok(markers)
    }

    // ------------------------------------------------------------------
    // Sweep
    // ------------------------------------------------------------------

    pub async fn sweep_once(&self) -> Result<SweepReport, WatcherError> {
        let Some(_permit) = self.sweep_guard.try_enter() else {
            return Ok(SweepReport::Skipped);
        };

        let tip = self.chain.height().await?;
        let watched = self.directory.addresses_for_currency(self.currency).await?;
        let mut addresses: Vec<&String> = watched.iter().collect();
        addresses.sort();

        let mut blocks: BTreeMap<u64, ScannedBlock> = BTreeMap::new();
        let mut observations = 0;
        let mut failures = 0;
        let mut reorg = None;

        for address in &addresses {
            let result = self
                .sweep_address(address, tip, &watched, &mut blocks, &mut reorg)
                .await;
            match result {
                Ok(count) => observations += count,
                Err(e) => {
                    warn!(currency = %self.currency, address = %address, error = %e, "Sweep failed for address");
                    failures += 1;
                }
            }
        }

        Ok(SweepReport::Swept {
            addresses: addresses.len(),
            blocks_fetched: blocks.len(),
            observations,
            failures,
            reorg,
        })
    }

    async fn sweep_address(
        &self,
        address: &str,
        tip: u64,
        watched: &std::collections::HashSet<String>,
        blocks: &mut BTreeMap<u64, ScannedBlock>,
        reorg: &mut Option<ReorgReport>,
    ) -> Result<usize, WatcherError> {
        let cursor_key = keys::last_scanned(self.currency, address);

        let start = match self.load_cursor(&cursor_key).await? {
            None => tip.saturating_sub(self.settings.initial_lookback),
            Some(cursor) => {
                if reorg.is_none() && self.cursor_reorged(cursor).await? {
                    let fork_point = cursor.saturating_sub(self.settings.reorg_depth);
                    *reorg = Some(self.handle_reorg(fork_point).await?);
                }
                // The reorg policy may have moved this cursor back
                match read_cursor(self.kv.as_ref(), &cursor_key).await? {
                    Some(c) => c + 1,
                    None => cursor + 1,
                }
            }
        };

        if start > tip {
            return Ok(0);
        }
        let end = tip.min(start + self.settings.sweep_window - 1);

        let mut observations = 0;
        for height in start..=end {
            if !blocks.contains_key(&height) {
                let hash = self.chain.block_hash(height).await?;
                self.remember_hash(height, &hash).await?;
                let block = self.chain.block(&hash).await?;
                blocks.insert(
                    height,
                    ScannedBlock {
                        confirmations: block.confirmations,
                        payments: block.payments_to(watched),
                    },
                );
            }
            let Some(block) = blocks.get(&height) else {
                continue;
            };

            for payment in block.payments.iter().filter(|p| p.address == address) {
                let observation = Observation::new(
                    self.currency,
                    payment.txid.as_str(),
                    payment.amount,
                    &payment.address,
                    block.confirmations,
                )
                .at_height(height);

                let outcome = self.processor.handle_observation(&observation).await?;
                debug!(
                    tx_hash = %payment.txid,
                    height,
                    outcome = outcome.label(),
                    "Sweep observation processed"
                );
                observations += 1;
            }
        }

        write_cursor(self.kv.as_ref(), &cursor_key, end).await?;
        Ok(observations)
    }

    /// A corrupt cursor is treated as unseen so the address restarts from
    /// the initial lookback; the next write overwrites it.
    async fn load_cursor(&self, key: &str) -> Result<Option<u64>, WatcherError> {
        match read_cursor(self.kv.as_ref(), key).await {
            Err(WatcherError::CorruptCursor { key, value }) => {
                warn!(key = %key, value = %value, "Resetting corrupt sweep cursor");
                Ok(None)
            }
            other => other,
        }
    }

    async fn cursor_reorged(&self, cursor: u64) -> Result<bool, WatcherError> {
        let Some(stored) = self.kv.get(&keys::block_hash(self.currency, cursor)).await? else {
            return Ok(false);
        };
        Ok(self.chain.block_hash(cursor).await? != stored)
    }

    async fn remember_hash(&self, height: u64, hash: &str) -> Result<(), WatcherError> {
        self.kv
            .set(&keys::block_hash(self.currency, height), hash, Some(BLOCK_HASH_TTL))
            .await?;
        Ok(())
    }

    /// Current sweep cursors keyed by address
    pub async fn sweep_cursors(&self) -> Result<HashMap<String, u64>, WatcherError> {
        let prefix = keys::last_scanned_prefix(self.currency);
        let mut cursors = HashMap::new();
        for key in self.kv.keys_with_prefix(&prefix).await? {
            match read_cursor(self.kv.as_ref(), &key).await {
                Ok(Some(value)) => {
                    cursors.insert(key[prefix.len()..].to_string(), value);
                }
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable sweep cursor"),
            }
        }
        Ok(cursors)
    }
}

/// Periodic sweep adapter for the scheduler
pub struct EthereumSweep(pub Arc<EthereumWatcher>);

#[async_trait]
impl PeriodicTask for EthereumSweep {
    fn name(&self) -> &'static str {
        "ethereum-sweep"
    }

    async fn tick(&self) {
        let currency = self.0.currency();
        match self.0.sweep_once().await {
            Ok(SweepReport::Swept {
                addresses,
                blocks_fetched,
                observations,
                failures,
                reorg,
            }) => info!(
                currency = %currency,
                addresses,
                blocks_fetched,
                observations,
                failures,
                reorg = reorg.is_some(),
                "Sweep finished"
            ),
            Ok(SweepReport::Skipped) => debug!(currency = %currency, "Previous sweep still running"),
            Err(e) => warn!(currency = %currency, error = %e, "Sweep failed, will retry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainBlock, ChainClients, ChainTx, MockChainRpc, TxOutput};
    use crate::notify::NullSink;
    use crate::processor::ConfirmationPolicy;
    use crate::storage::{LedgerStore, MemoryKvStore, SqliteLedgerStore};
    use crate::types::{DepositAddress, TxStatus};

    const ALICE: &str = "0x00000000000000000000000000000000000000aa";
    const BOB: &str = "0x00000000000000000000000000000000000000bb";

    struct Fixture {
        ledger: Arc<SqliteLedgerStore>,
        kv: MemoryKvStore,
        directory: Arc<AddressDirectory>,
        processor: Arc<DepositProcessor>,
    }

    async fn fixture() -> Fixture {
        let ledger = Arc::new(SqliteLedgerStore::in_memory().unwrap());
        for (user, addr) in [("alice", ALICE), ("bob", BOB)] {
            ledger
                .insert_address(&DepositAddress::new(user.into(), Currency::Eth, addr))
                .await
                .unwrap();
        }
        let kv = MemoryKvStore::new();
        let directory = Arc::new(AddressDirectory::new(
            ledger.clone(),
            Arc::new(kv.clone()),
            ChainClients::new(),
        ));
        let processor = Arc::new(DepositProcessor::new(
            directory.clone(),
            ledger.clone(),
            Arc::new(kv.clone()),
            Arc::new(NullSink),
            ConfirmationPolicy::default(),
        ));
        Fixture {
            ledger,
            kv,
            directory,
            processor,
        }
    }

    fn watcher(f: &Fixture, chain: MockChainRpc, settings: EthereumSettings) -> EthereumWatcher {
        EthereumWatcher::new(
            Currency::Eth,
            Arc::new(chain),
            f.directory.clone(),
            f.processor.clone(),
            Arc::new(f.kv.clone()),
            settings,
        )
    }

    fn head(number: u64, hash: &str, parent: &str) -> BlockHead {
        BlockHead {
            number,
            hash: hash.to_string(),
            parent_hash: parent.to_string(),
        }
    }

    async fn seed_pending(f: &Fixture, tx: &str, block: Option<u64>) {
        let observation = Observation::new(Currency::Eth, tx, 50_000_000, ALICE, 1);
        let observation = match block {
            Some(b) => observation.at_height(b),
            None => observation,
        };
        f.processor.handle_observation(&observation).await.unwrap();
    }

    #[tokio::test]
    async fn test_new_head_refreshes_pending_confirmations() {
        let f = fixture().await;
        seed_pending(&f, "0xt1", Some(100)).await;

        let mut chain = MockChainRpc::new();
        chain.expect_confirmations_of().never();
        let w = watcher(&f, chain, EthereumSettings::default());

        let report = w.on_new_head(&head(105, "0xh105", "0xh104")).await.unwrap();
        assert_eq!(report.resubmitted, 1);
        assert!(report.reorg.is_none());

        let tx = f.ledger.transaction_by_hash("0xt1").await.unwrap().unwrap();
        assert_eq!(tx.confirmations, 6);

        // Threshold reached on a later head
        w.on_new_head(&head(111, "0xh111", "0xh110")).await.unwrap();
        let tx = f.ledger.transaction_by_hash("0xt1").await.unwrap().unwrap();
        assert_eq!(tx.status, TxStatus::Confirmed);
        let balance = f.ledger.balance("alice", Currency::Eth).await.unwrap().unwrap();
        assert_eq!(balance.amount, 50_000_000);
    }

    #[tokio::test]
    async fn test_marker_without_block_asks_chain() {
        let f = fixture().await;
        seed_pending(&f, "0xt2", None).await;

        let mut chain = MockChainRpc::new();
        chain.expect_confirmations_of().times(1).returning(|_| Ok(3));
        let w = watcher(&f, chain, EthereumSettings::default());

        w.on_new_head(&head(50, "0xh50", "0xh49")).await.unwrap();
        let tx = f.ledger.transaction_by_hash("0xt2").await.unwrap().unwrap();
        assert_eq!(tx.confirmations, 3);
    }

    #[tokio::test]
    async fn test_parent_mismatch_triggers_reorg_policy() {
        let f = fixture().await;
        seed_pending(&f, "0xt3", Some(195)).await;
        f.kv.set("eth:block_hash:199", "0xold199", None).await.unwrap();
        f.kv.set(&keys::last_scanned(Currency::Eth, ALICE), "199", None).await.unwrap();
        f.kv.set(&keys::last_scanned(Currency::Eth, BOB), "150", None).await.unwrap();

        let mut chain = MockChainRpc::new();
        chain.expect_height().returning(|| Ok(200));
        // Re-mined in block 198
        chain.expect_confirmations_of().returning(|_| Ok(3));
        let w = watcher(&f, chain, EthereumSettings::default());

        let report = w.on_new_head(&head(200, "0xnew200", "0xnew199")).await.unwrap();
        let reorg = report.reorg.unwrap();
        assert_eq!(reorg.fork_point, 188);
        assert_eq!(reorg.revalidated, 1);
        assert_eq!(reorg.cursors_rewound, 1);

        let cursors = w.sweep_cursors().await.unwrap();
        assert_eq!(cursors.get(ALICE), Some(&187));
        assert_eq!(cursors.get(BOB), Some(&150));

        let tx = f.ledger.transaction_by_hash("0xt3").await.unwrap().unwrap();
        assert_eq!(tx.block_number, Some(198));
        assert_eq!(tx.confirmations, 3);
        assert_eq!(f.kv.get("eth:block_hash:200").await.unwrap(), Some("0xnew200".to_string()));
    }

    #[tokio::test]
    async fn test_reorged_out_deposit_forgets_its_block() {
        let f = fixture().await;
        seed_pending(&f, "0xt4", Some(195)).await;

        let mut chain = MockChainRpc::new();
        chain.expect_height().returning(|| Ok(200));
        chain.expect_confirmations_of().returning(|_| Ok(0));
        let w = watcher(&f, chain, EthereumSettings::default());

        w.handle_reorg(190).await.unwrap();

        let raw = f
            .kv
            .get(&keys::deposit_pending(Currency::Eth, "0xt4"))
            .await
            .unwrap()
            .unwrap();
        let marker: PendingDeposit = serde_json::from_str(&raw).unwrap();
        assert_eq!(marker.block_number, None);
        let tx = f.ledger.transaction_by_hash("0xt4").await.unwrap().unwrap();
        assert_eq!(tx.confirmations, 0);
        assert_eq!(tx.status, TxStatus::Pending);
    }

    fn block_with(height: u64, tip: u64, payments: &[(&str, &str, u64)]) -> ChainBlock {
        ChainBlock {
            hash: format!("0xh{}", height),
            parent_hash: Some(format!("0xh{}", height.saturating_sub(1))),
            height,
            confirmations: confirmations_at(tip, height),
            transactions: payments
                .iter()
                .map(|(tx, to, value)| ChainTx {
                    txid: tx.to_string(),
                    outputs: vec![TxOutput { address: to.to_string(), value: *value }],
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_sweep_scans_window_and_shares_blocks() {
        let f = fixture().await;

        let mut chain = MockChainRpc::new();
        chain.expect_height().returning(|| Ok(1_000));
        chain.expect_block_hash().returning(|h| Ok(format!("0xh{}", h)));
        // 10 blocks fetched once even though two addresses scan them
        chain.expect_block().times(10).returning(|hash| {
            let height: u64 = hash[3..].parse().unwrap();
            let payments: Vec<(&str, &str, u64)> = match height {
                993 => vec![("0xpay-alice", ALICE, 20_000_000)],
                995 => vec![("0xpay-bob", BOB, 30_000_000), ("0xzero", BOB, 0)],
                _ => vec![],
            };
            Ok(block_with(height, 1_000, &payments))
        });

        let settings = EthereumSettings {
            reorg_depth: 12,
            sweep_window: 10,
            initial_lookback: 9,
        };
        let w = watcher(&f, chain, settings);

        let report = w.sweep_once().await.unwrap();
        assert_eq!(
            report,
            SweepReport::Swept {
                addresses: 2,
                blocks_fetched: 10,
                observations: 2,
                failures: 0,
                reorg: None,
            }
        );

        let alice_tx = f.ledger.transaction_by_hash("0xpay-alice").await.unwrap().unwrap();
        assert_eq!(alice_tx.confirmations, 8);
        assert_eq!(alice_tx.user_id, "alice");
        assert!(f.ledger.transaction_by_hash("0xzero").await.unwrap().is_none());

        let cursors = w.sweep_cursors().await.unwrap();
        assert_eq!(cursors.get(ALICE), Some(&1_000));
        assert_eq!(cursors.get(BOB), Some(&1_000));
    }

    #[tokio::test]
    async fn test_sweep_isolates_failing_address() {
        let f = fixture().await;
        f.kv.set(&keys::last_scanned(Currency::Eth, ALICE), "40", None).await.unwrap();
        f.kv.set(&keys::last_scanned(Currency::Eth, BOB), "95", None).await.unwrap();

        let mut chain = MockChainRpc::new();
        chain.expect_height().returning(|| Ok(100));
        // Only ALICE's window reaches block 50
        chain.expect_block_hash().returning(|h| {
            if h == 50 {
                Err(crate::chain::ChainError::MissingResult("eth_getBlockByNumber".into()))
            } else {
                Ok(format!("0xh{}", h))
            }
        });
        chain
            .expect_block()
            .returning(|hash| Ok(block_with(hash[3..].parse().unwrap(), 100, &[])));
        let w = watcher(&f, chain, EthereumSettings::default());

        match w.sweep_once().await.unwrap() {
            SweepReport::Swept { failures, blocks_fetched, .. } => {
                assert_eq!(failures, 1);
                // 41..=49 for ALICE before the failure, 96..=100 for BOB
                assert_eq!(blocks_fetched, 14);
            }
            other => panic!("unexpected {:?}", other),
        }
        let cursors = w.sweep_cursors().await.unwrap();
        assert_eq!(cursors.get(ALICE), Some(&40));
        assert_eq!(cursors.get(BOB), Some(&100));
    }

    #[tokio::test]
    async fn test_corrupt_cursor_restarts_from_lookback() {
        let f = fixture().await;
        f.kv.set(&keys::last_scanned(Currency::Eth, ALICE), "not-a-number", None)
            .await
            .unwrap();
        f.kv.set(&keys::last_scanned(Currency::Eth, BOB), "95", None).await.unwrap();

        let mut chain = MockChainRpc::new();
        chain.expect_height().returning(|| Ok(100));
        chain.expect_block_hash().returning(|h| Ok(format!("0xh{}", h)));
        chain.expect_block().returning(|hash| {
            let height: u64 = hash[3..].parse().unwrap();
            let payments: Vec<(&str, &str, u64)> = match height {
                93 => vec![("0xlate-alice", ALICE, 10_000_000)],
                _ => vec![],
            };
            Ok(block_with(height, 100, &payments))
        });
        let settings = EthereumSettings {
            reorg_depth: 12,
            sweep_window: 10,
            initial_lookback: 9,
        };
        let w = watcher(&f, chain, settings);

        // Unreadable cursors are left out rather than failing the listing
        let cursors = w.sweep_cursors().await.unwrap();
        assert_eq!(cursors.get(ALICE), None);
        assert_eq!(cursors.get(BOB), Some(&95));

        match w.sweep_once().await.unwrap() {
            SweepReport::Swept { failures, observations, blocks_fetched, .. } => {
                assert_eq!(failures, 0);
                assert_eq!(observations, 1);
                assert_eq!(blocks_fetched, 10);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(f.ledger.transaction_by_hash("0xlate-alice").await.unwrap().is_some());

        let cursors = w.sweep_cursors().await.unwrap();
        assert_eq!(cursors.get(ALICE), Some(&100));
        assert_eq!(cursors.get(BOB), Some(&100));
    }

    #[tokio::test]
    async fn test_sweep_rewinds_on_hash_mismatch() {
        let f = fixture().await;
        f.kv.set(&keys::last_scanned(Currency::Eth, ALICE), "100", None).await.unwrap();
        f.kv.set(&keys::last_scanned(Currency::Eth, BOB), "100", None).await.unwrap();
        f.kv.set("eth:block_hash:100", "0xorphan", None).await.unwrap();

        let mut chain = MockChainRpc::new();
        chain.expect_height().returning(|| Ok(100));
        chain.expect_block_hash().returning(|h| Ok(format!("0xh{}", h)));
        chain
            .expect_block()
            .returning(|hash| Ok(block_with(hash[3..].parse().unwrap(), 100, &[])));
        let settings = EthereumSettings {
            reorg_depth: 5,
            ..EthereumSettings::default()
        };
        let w = watcher(&f, chain, settings);

        match w.sweep_once().await.unwrap() {
            SweepReport::Swept { reorg, blocks_fetched, .. } => {
                assert_eq!(reorg.unwrap().fork_point, 95);
                // 95..=100 rescanned once and shared
                assert_eq!(blocks_fetched, 6);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(f.kv.get("eth:block_hash:100").await.unwrap(), Some("0xh100".to_string()));
    }
}
