//! Chain RPC Capability
//!
//! Everything the pipeline needs from a chain node, behind one trait so the
//! watchers, the monitor and the address directory can be driven by a real
//! JSON-RPC client or by a fake in tests.

pub mod bitcoin;
pub mod ethereum;
pub mod jsonrpc;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::types::Currency;

pub use bitcoin::BitcoinRpcClient;
pub use ethereum::EthereumRpcClient;

/// Chain access errors. All of them are transient from the pipeline's
/// point of view: nothing is written and the next tick retries.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing result for {0}")]
    MissingResult(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Subscription error: {0}")]
    Subscription(String),
}

impl From<serde_json::Error> for ChainError {
    fn from(e: serde_json::Error) -> Self {
        ChainError::Parse(e.to_string())
    }
}

pub type ChainResult<T> = Result<T, ChainError>;

/// One payment output, already converted to 1e-8 base units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub address: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTx {
    pub txid: String,
    pub outputs: Vec<TxOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBlock {
    pub hash: String,
    pub parent_hash: Option<String>,
    pub height: u64,
    pub confirmations: u32,
    pub transactions: Vec<ChainTx>,
}

/// A non-zero payment from a block to a watched address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub txid: String,
    pub address: String,
    pub amount: u64,
}

impl ChainBlock {
    /// Payments to any address in `watched`. Outputs of one transaction to
    /// the same address are summed.
    pub fn payments_to(&self, watched: &HashSet<String>) -> Vec<Payment> {
        let mut payments = Vec::new();
        for tx in &self.transactions {
            let mut per_address: Vec<Payment> = Vec::new();
            for output in tx.outputs.iter().filter(|o| watched.contains(&o.address)) {
                match per_address.iter_mut().find(|p| p.address == output.address) {
                    Some(existing) => existing.amount = existing.amount.saturating_add(output.value),
                    None => per_address.push(Payment {
                        txid: tx.txid.clone(),
                        address: output.address.clone(),
                        amount: output.value,
                    }),
                }
            }
            payments.extend(per_address.into_iter().filter(|p| p.amount > 0));
        }
        payments
    }
}

/// A new chain head as announced by an Ethereum-style subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHead {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
}

/// Chain node capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Current tip height
    async fn height(&self) -> ChainResult<u64>;

    /// Hash of the block at `height` on the current best chain
    async fn block_hash(&self, height: u64) -> ChainResult<String>;

    /// Full block with per-output payment data
    async fn block(&self, hash: &str) -> ChainResult<ChainBlock>;

    /// Fresh confirmation count; 0 if unknown or unmined
    async fn confirmations_of(&self, tx_hash: &str) -> ChainResult<u32>;

    /// Ask the node for a fresh receiving address
    async fn generate_address(&self, owner_hint: &str) -> ChainResult<String>;
}

/// Chain clients keyed by the currency they serve
pub type ChainClients = HashMap<Currency, Arc<dyn ChainRpc>>;

/// Confirmations of a block at `height` given the tip
pub fn confirmations_at(tip: u64, height: u64) -> u32 {
    if height > tip {
        return 0;
    }
    u32::try_from(tip - height + 1).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> ChainBlock {
        ChainBlock {
            hash: "h1".to_string(),
            parent_hash: None,
            height: 10,
            confirmations: 1,
            transactions: vec![
                ChainTx {
                    txid: "tx-a".to_string(),
                    outputs: vec![
                        TxOutput { address: "watched".to_string(), value: 500 },
                        TxOutput { address: "change".to_string(), value: 900 },
                        TxOutput { address: "watched".to_string(), value: 250 },
                    ],
                },
                ChainTx {
                    txid: "tx-b".to_string(),
                    outputs: vec![TxOutput { address: "watched".to_string(), value: 0 }],
                },
            ],
        }
    }

    #[test]
    fn test_payments_to_sums_outputs_and_skips_zero() {
        let watched: HashSet<String> = ["watched".to_string()].into_iter().collect();
        let payments = block().payments_to(&watched);

        assert_eq!(
            payments,
            vec![Payment {
                txid: "tx-a".to_string(),
                address: "watched".to_string(),
                amount: 750,
            }]
        );
    }

    #[test]
    fn test_confirmations_at() {
        assert_eq!(confirmations_at(100, 100), 1);
        assert_eq!(confirmations_at(100, 89), 12);
        assert_eq!(confirmations_at(100, 101), 0);
    }
}
