//! Deposit Service
//!
//! Builds every capability handle from configuration and owns the
//! background tasks:
//! - Bitcoin block poller
//! - Ethereum sweep and live `newHeads` subscription
//! - confirmation monitor
//! - KV janitor (expired marker cleanup)

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::{self, ApiState};
use crate::chain::{BitcoinRpcClient, ChainClients, ChainRpc, EthereumRpcClient};
use crate::common::{log_system_event, DepositdConfig, DepositdError, Result};
use crate::directory::AddressDirectory;
use crate::monitor::ConfirmationMonitor;
use crate::notify::NotificationHub;
use crate::processor::{ConfirmationPolicy, DepositProcessor};
use crate::scheduler::{spawn_periodic, PeriodicTask};
use crate::storage::{open_pool, SqliteKvStore, SqliteLedgerStore, SqlitePool};
use crate::types::Currency;
use crate::watcher::ethereum::{EthereumSettings, EthereumSweep};
use crate::watcher::subscription::run_head_subscription;
use crate::watcher::{BitcoinPoller, EthereumWatcher};

const KV_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Deletes expired KV rows so markers and block hashes do not pile up
struct KvJanitor(Arc<SqliteKvStore>);

#[async_trait]
impl PeriodicTask for KvJanitor {
    fn name(&self) -> &'static str {
        "kv-janitor"
    }

    async fn tick(&self) {
        match self.0.purge_expired() {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Purged expired KV entries"),
            Err(e) => warn!(error = %e, "KV purge failed"),
        }
    }
}

pub struct DepositService {
    config: DepositdConfig,
    kv: Arc<SqliteKvStore>,
    directory: Arc<AddressDirectory>,
    processor: Arc<DepositProcessor>,
    hub: NotificationHub,
    bitcoin: Option<Arc<BitcoinPoller>>,
    ethereum: Option<Arc<EthereumWatcher>>,
    monitor: Arc<ConfirmationMonitor>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl DepositService {
    /// Open the database and connect a JSON-RPC client per watched currency
    pub fn from_config(config: DepositdConfig) -> Result<Self> {
        let pool = open_pool(&config.database_path)?;
        let chains = Self::chain_clients(&config)?;
        Self::from_parts(config, pool, chains)
    }

    /// Assemble the service around an existing pool and chain clients
    pub fn from_parts(config: DepositdConfig, pool: SqlitePool, chains: ChainClients) -> Result<Self> {
        let ledger = Arc::new(SqliteLedgerStore::from_pool(pool.clone())?);
        let kv = Arc::new(SqliteKvStore::from_pool(pool)?);
        let hub = NotificationHub::default();

        let directory = Arc::new(AddressDirectory::new(ledger.clone(), kv.clone(), chains.clone()));
        let processor = Arc::new(
            DepositProcessor::new(
                directory.clone(),
                ledger.clone(),
                kv.clone(),
                Arc::new(hub.clone()),
                ConfirmationPolicy::new(config.btc_confirmations, config.eth_confirmations),
            )
            .with_lock_ttl(config.lock_ttl),
        );

        let bitcoin = chains.get(&Currency::Btc).map(|chain| {
            Arc::new(BitcoinPoller::new(
                Currency::Btc,
                chain.clone(),
                directory.clone(),
                processor.clone(),
                kv.clone(),
                config.reorg_depth,
            ))
        });

        let ethereum = chains.get(&Currency::Eth).map(|chain| {
            Arc::new(EthereumWatcher::new(
                Currency::Eth,
                chain.clone(),
                directory.clone(),
                processor.clone(),
                kv.clone(),
                EthereumSettings {
                    reorg_depth: config.reorg_depth,
                    sweep_window: config.eth_sweep_window,
                    initial_lookback: config.eth_initial_lookback,
                },
            ))
        });

        let monitor = Arc::new(ConfirmationMonitor::new(
            ledger,
            chains,
            processor.clone(),
            kv.clone(),
            config.stale_after,
        ));

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            kv,
            directory,
            processor,
            hub,
            bitcoin,
            ethereum,
            monitor,
            shutdown_tx,
            tasks: Vec::new(),
        })
    }

    fn chain_clients(config: &DepositdConfig) -> Result<ChainClients> {
        let mut chains: ChainClients = HashMap::new();
        for currency in &config.currencies {
            let client: Arc<dyn ChainRpc> = match currency {
                Currency::Btc => Arc::new(BitcoinRpcClient::new(
                    &config.btc_rpc_url,
                    config.btc_rpc_user.clone(),
                    config.btc_rpc_password.clone(),
                )?),
                Currency::Eth => Arc::new(EthereumRpcClient::new(
                    &config.eth_rpc_url,
                    config.eth_account_passphrase.clone(),
                )?),
            };
            chains.insert(*currency, client);
        }
        Ok(chains)
    }

    pub fn directory(&self) -> Arc<AddressDirectory> {
        self.directory.clone()
    }

    pub fn processor(&self) -> Arc<DepositProcessor> {
        self.processor.clone()
    }

    pub fn hub(&self) -> NotificationHub {
        self.hub.clone()
    }

    pub fn monitor(&self) -> Arc<ConfirmationMonitor> {
        self.monitor.clone()
    }

    pub fn bitcoin_poller(&self) -> Option<Arc<BitcoinPoller>> {
        self.bitcoin.clone()
    }

    pub fn ethereum_watcher(&self) -> Option<Arc<EthereumWatcher>> {
        self.ethereum.clone()
    }

    pub fn api_state(&self) -> ApiState {
        ApiState {
            directory: self.directory.clone(),
            processor: self.processor.clone(),
            hub: self.hub.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Spawn every background task
    pub fn start(&mut self) {
        if self.is_running() {
            warn!("Deposit service already started");
            return;
        }
        let shutdown = self.shutdown_tx.subscribe();

        if let Some(poller) = &self.bitcoin {
            self.tasks.push(spawn_periodic(
                poller.clone(),
                self.config.btc_poll_interval,
                shutdown.clone(),
            ));
        }

        if let Some(watcher) = &self.ethereum {
            self.tasks.push(spawn_periodic(
                Arc::new(EthereumSweep(watcher.clone())),
                self.config.eth_sweep_interval,
                shutdown.clone(),
            ));
            self.tasks.push(tokio::spawn(run_head_subscription(
                self.config.eth_ws_url.clone(),
                watcher.clone(),
                self.config.eth_reconnect_delay,
                shutdown.clone(),
            )));
        }

        self.tasks.push(spawn_periodic(
            self.monitor.clone(),
            self.config.monitor_interval,
            shutdown.clone(),
        ));
        self.tasks.push(spawn_periodic(
            Arc::new(KvJanitor(self.kv.clone())),
            KV_PURGE_INTERVAL,
            shutdown,
        ));

        log_system_event(
            "Deposit service started",
            serde_json::json!({
                "currencies": self.config.currencies.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
                "tasks": self.tasks.len()
            }),
        );
    }

    /// Spawn the HTTP/WebSocket API on the configured port
    pub fn spawn_api(&mut self) {
        let router = api::build_router(self.api_state());
        let port = self.config.api_port;
        let shutdown = self.shutdown_tx.subscribe();

        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = api::serve(port, router, shutdown).await {
                warn!(port, error = %e, "API server stopped with error");
            }
        }));
    }

    /// Signal every task and wait for in-flight work to finish
    pub async fn shutdown(&mut self) -> Result<()> {
        info!(tasks = self.tasks.len(), "Shutting down deposit service");
        // Receivers may all be gone already; nothing to signal then
        let _ = self.shutdown_tx.send(true);

        let mut failed = 0;
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(DepositdError::service(format!("{} task(s) panicked", failed)));
        }
        log_system_event("Deposit service stopped", serde_json::json!({}));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainRpc;
    use crate::storage::memory_pool;

    fn quiet_chain() -> Arc<dyn ChainRpc> {
        let mut chain = MockChainRpc::new();
        chain.expect_height().returning(|| Ok(10));
        chain.expect_block_hash().returning(|h| Ok(format!("h{}", h)));
        Arc::new(chain)
    }

    #[test]
    fn test_only_configured_watchers_are_built() {
        let mut chains: ChainClients = HashMap::new();
        chains.insert(Currency::Btc, quiet_chain());

        let service =
            DepositService::from_parts(DepositdConfig::default(), memory_pool().unwrap(), chains).unwrap();
        assert!(service.bitcoin_poller().is_some());
        assert!(service.ethereum_watcher().is_none());
        assert!(service.directory().supports(Currency::Btc));
        assert!(!service.directory().supports(Currency::Eth));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let mut chains: ChainClients = HashMap::new();
        chains.insert(Currency::Btc, quiet_chain());

        let mut service =
            DepositService::from_parts(DepositdConfig::default(), memory_pool().unwrap(), chains).unwrap();
        service.start();
        assert!(service.is_running());

        tokio::time::sleep(Duration::from_millis(20)).await;
        service.shutdown().await.unwrap();
        assert!(!service.is_running());
    }
}
