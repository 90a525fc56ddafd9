//! Bitcoin Core JSON-RPC Client
//!
//! Talks to a bitcoind node with wallet support. Deposit addresses are
//! generated by the node wallet (`getnewaddress`), which is also what lets
//! `gettransaction` report confirmations for incoming payments.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::jsonrpc::JsonRpcClient;
use super::{ChainBlock, ChainError, ChainResult, ChainRpc, ChainTx, TxOutput};
use crate::types::coin_to_units;

/// RPC_INVALID_ADDRESS_OR_KEY: unknown or non-wallet transaction
const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;

#[derive(Debug, Clone)]
pub struct BitcoinRpcClient {
    rpc: JsonRpcClient,
}

impl BitcoinRpcClient {
    pub fn new(url: &str, user: Option<String>, password: Option<String>) -> ChainResult<Self> {
        let auth = user.map(|u| (u, password.unwrap_or_default()));
        Ok(Self {
            rpc: JsonRpcClient::new(url.trim_end_matches('/'), auth)?,
        })
    }

    pub fn url(&self) -> &str {
        self.rpc.url()
    }
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    hash: String,
    height: u64,
    /// -1 when the block is no longer on the best chain
    confirmations: i64,
    #[serde(rename = "previousblockhash")]
    previous_block_hash: Option<String>,
    #[serde(default)]
    tx: Vec<RpcTx>,
}

#[derive(Debug, Deserialize)]
struct RpcTx {
    txid: String,
    #[serde(default)]
    vout: Vec<RpcVout>,
}

#[derive(Debug, Deserialize)]
struct RpcVout {
    value: f64,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: RpcScriptPubKey,
}

#[derive(Debug, Deserialize)]
struct RpcScriptPubKey {
    /// bitcoind >= 22
    address: Option<String>,
    /// older nodes
    addresses: Option<Vec<String>>,
}

impl RpcScriptPubKey {
    fn single_address(&self) -> Option<&str> {
        if let Some(address) = &self.address {
            return Some(address);
        }
        match self.addresses.as_deref() {
            Some([only]) => Some(only),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcWalletTx {
    confirmations: i64,
}

impl From<RpcBlock> for ChainBlock {
    fn from(block: RpcBlock) -> Self {
        let transactions = block
            .tx
            .into_iter()
            .map(|tx| ChainTx {
                outputs: tx
                    .vout
                    .iter()
                    .filter_map(|out| {
                        out.script_pub_key.single_address().map(|address| TxOutput {
                            address: address.to_string(),
                            value: coin_to_units(out.value),
                        })
                    })
                    .collect(),
                txid: tx.txid,
            })
            .collect();

        ChainBlock {
            hash: block.hash,
            parent_hash: block.previous_block_hash,
            height: block.height,
            confirmations: clamp_confirmations(block.confirmations),
            transactions,
        }
    }
}

fn clamp_confirmations(raw: i64) -> u32 {
    u32::try_from(raw.max(0)).unwrap_or(u32::MAX)
}

#[async_trait]
impl ChainRpc for BitcoinRpcClient {
    async fn height(&self) -> ChainResult<u64> {
        self.rpc.call("getblockcount", json!([])).await
    }

    async fn block_hash(&self, height: u64) -> ChainResult<String> {
        self.rpc.call("getblockhash", json!([height])).await
    }

    async fn block(&self, hash: &str) -> ChainResult<ChainBlock> {
        let block: RpcBlock = self.rpc.call("getblock", json!([hash, 2])).await?;
        Ok(block.into())
    }

    async fn confirmations_of(&self, tx_hash: &str) -> ChainResult<u32> {
        match self
            .rpc
            .call::<RpcWalletTx>("gettransaction", json!([tx_hash]))
            .await
        {
            Ok(tx) => Ok(clamp_confirmations(tx.confirmations)),
            // The wallet forgot the transaction (evicted or replaced)
            Err(ChainError::Rpc { code, .. }) if code == RPC_INVALID_ADDRESS_OR_KEY => Ok(0),
            Err(e) => Err(e),
        }
    }

    async fn generate_address(&self, owner_hint: &str) -> ChainResult<String> {
        self.rpc.call("getnewaddress", json!([owner_hint])).await
    }
}
