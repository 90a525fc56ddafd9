//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use depositd::chain::{confirmations_at, ChainResult};
use depositd::storage::memory_pool;
use depositd::{
    BlockHead, ChainBlock, ChainClients, ChainError, ChainRpc, ChainTx, Currency, DepositService,
    DepositdConfig, TxOutput,
};

struct FakeBlock {
    hash: String,
    parent: String,
    transactions: Vec<ChainTx>,
}

struct State {
    fork: u32,
    blocks: Vec<FakeBlock>,
    next_address: u32,
}

/// In-process chain with deterministic hashes. A reorg bumps the fork id so
/// every replaced block gets a new hash.
pub struct FakeChain {
    currency: Currency,
    state: Mutex<State>,
}

impl FakeChain {
    pub fn new(currency: Currency, height: u64) -> Self {
        let chain = Self {
            currency,
            state: Mutex::new(State {
                fork: 0,
                blocks: Vec::new(),
                next_address: 1,
            }),
        };
        for _ in 0..=height {
            chain.mine(Vec::new());
        }
        chain
    }

    fn hash_for(&self, fork: u32, height: u64) -> String {
        match self.currency {
            Currency::Btc => format!("f{}-{:08}", fork, height),
            Currency::Eth => format!("0xf{}{:08}", fork, height),
        }
    }

    pub fn tip(&self) -> u64 {
        self.state.lock().unwrap().blocks.len() as u64 - 1
    }

    /// Append a block; returns its height
    pub fn mine(&self, transactions: Vec<ChainTx>) -> u64 {
        let mut state = self.state.lock().unwrap();
        let height = state.blocks.len() as u64;
        let parent = state
            .blocks
            .last()
            .map(|b| b.hash.clone())
            .unwrap_or_default();
        let hash = self.hash_for(state.fork, height);
        state.blocks.push(FakeBlock {
            hash,
            parent,
            transactions,
        });
        height
    }

    pub fn mine_empty(&self, count: u64) {
        for _ in 0..count {
            self.mine(Vec::new());
        }
    }

    /// Drop every block from `from_height` up and mine the replacements
    pub fn reorg(&self, from_height: u64, replacement: Vec<Vec<ChainTx>>) {
        {
            let mut state = self.state.lock().unwrap();
            state.blocks.truncate(from_height as usize);
            state.fork += 1;
        }
        for transactions in replacement {
            self.mine(transactions);
        }
    }

    pub fn head(&self, height: u64) -> BlockHead {
        let state = self.state.lock().unwrap();
        let block = &state.blocks[height as usize];
        BlockHead {
            number: height,
            hash: block.hash.clone(),
            parent_hash: block.parent.clone(),
        }
    }
}

pub fn pay(txid: &str, address: &str, value: u64) -> ChainTx {
    ChainTx {
        txid: txid.to_string(),
        outputs: vec![TxOutput {
            address: address.to_string(),
            value,
        }],
    }
}

#[async_trait]
impl ChainRpc for FakeChain {
    async fn height(&self) -> ChainResult<u64> {
        Ok(self.tip())
    }

    async fn block_hash(&self, height: u64) -> ChainResult<String> {
        let state = self.state.lock().unwrap();
        state
            .blocks
            .get(height as usize)
            .map(|b| b.hash.clone())
            .ok_or_else(|| ChainError::NotFound(format!("block {}", height)))
    }

    async fn block(&self, hash: &str) -> ChainResult<ChainBlock> {
        let state = self.state.lock().unwrap();
        let tip = state.blocks.len() as u64 - 1;
        let (height, block) = state
            .blocks
            .iter()
            .enumerate()
            .find(|(_, b)| b.hash == hash)
            .ok_or_else(|| ChainError::NotFound(format!("block {}", hash)))?;

        Ok(ChainBlock {
            hash: block.hash.clone(),
            parent_hash: Some(block.parent.clone()),
            height: height as u64,
            confirmations: confirmations_at(tip, height as u64),
            transactions: block.transactions.clone(),
        })
    }

    async fn confirmations_of(&self, tx_hash: &str) -> ChainResult<u32> {
        let state = self.state.lock().unwrap();
        let tip = state.blocks.len() as u64 - 1;
        let mined_at = state
            .blocks
            .iter()
            .position(|b| b.transactions.iter().any(|tx| tx.txid == tx_hash));
        Ok(mined_at.map_or(0, |h| confirmations_at(tip, h as u64)))
    }

    async fn generate_address(&self, _owner_hint: &str) -> ChainResult<String> {
        let mut state = self.state.lock().unwrap();
        let n = state.next_address;
        state.next_address += 1;
        Ok(match self.currency {
            Currency::Btc => format!("bcrt1qfakeaddress{:06}", n),
            Currency::Eth => format!("0x{:040x}", n),
        })
    }
}

/// A service over an in-memory database and the given fake chains
pub fn service_with(config: DepositdConfig, fakes: &[Arc<FakeChain>]) -> DepositService {
    let mut chains: ChainClients = HashMap::new();
    for fake in fakes {
        chains.insert(fake.currency, fake.clone());
    }
    DepositService::from_parts(config, memory_pool().unwrap(), chains).unwrap()
}
