//! depositd - Multi-chain Deposit Pipeline
//!
//! Watches Bitcoin-style and Ethereum-style chains for payments to assigned
//! deposit addresses and credits user balances exactly once per deposit.
//!
//! ## Components
//!
//! 1. **Address Directory** - (currency, address) to user mapping
//! 2. **Chain Watchers** - block poller, `newHeads` subscription, sweep
//! 3. **Deposit Processor** - idempotent, locked, atomic state machine
//! 4. **Confirmation Monitor** - re-checks pending deposits, retires stale ones
//! 5. **Notifications** - per-user push over WebSocket
//!
//! Every producer funnels into [`DepositProcessor::handle_observation`];
//! nothing else writes deposit or balance state.

pub mod api;
pub mod chain;
pub mod common;
pub mod directory;
pub mod monitor;
pub mod notify;
pub mod processor;
pub mod scheduler;
pub mod service;
pub mod storage;
pub mod types;
pub mod watcher;

// Re-exports: configuration and errors
pub use common::{DepositdConfig, DepositdError, Network};

// Re-exports: pipeline
pub use directory::{AddressDirectory, DirectoryError};
pub use monitor::{ConfirmationMonitor, MonitorReport};
pub use processor::{ConfirmationPolicy, DepositProcessor, ObservationOutcome, ProcessorError};
pub use service::DepositService;
pub use watcher::{BitcoinPoller, EthereumWatcher, PollReport, SweepReport, WatcherError};

// Re-exports: chain access
pub use chain::{BlockHead, ChainBlock, ChainClients, ChainError, ChainRpc, ChainTx, TxOutput};

// Re-exports: notifications
pub use notify::{DepositEvent, NotificationHub, NotificationSink};

// Re-exports: types
pub use types::{
    BalanceRecord, Currency, DepositAddress, Observation, TransactionRecord, TxStatus,
};
