//! Ethereum JSON-RPC Client
//!
//! HTTP client for block and transaction reads plus `personal_newAccount`
//! for node-managed deposit accounts. Quantities arrive hex-encoded.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::jsonrpc::JsonRpcClient;
use super::{confirmations_at, BlockHead, ChainBlock, ChainError, ChainResult, ChainRpc, ChainTx, TxOutput};
use crate::types::wei_to_units;

#[derive(Debug, Clone)]
pub struct EthereumRpcClient {
    rpc: JsonRpcClient,
    account_passphrase: String,
}

impl EthereumRpcClient {
    pub fn new(url: &str, account_passphrase: impl Into<String>) -> ChainResult<Self> {
        Ok(Self {
            rpc: JsonRpcClient::new(url.trim_end_matches('/'), None)?,
            account_passphrase: account_passphrase.into(),
        })
    }

    pub fn url(&self) -> &str {
        self.rpc.url()
    }

    async fn fetch_block(&self, hash: &str) -> ChainResult<RpcBlock> {
        self.rpc
            .call_optional("eth_getBlockByHash", json!([hash, true]))
            .await?
            .ok_or_else(|| ChainError::NotFound(format!("block {}", hash)))
    }
}

/// Parse a hex quantity such as `0x1b4`
pub fn parse_quantity(raw: &str) -> ChainResult<u128> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Parse(format!("quantity without 0x prefix: {}", raw)))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).map_err(|e| ChainError::Parse(format!("{}: {}", raw, e)))
}

fn parse_u64(raw: &str) -> ChainResult<u64> {
    u64::try_from(parse_quantity(raw)?)
        .map_err(|_| ChainError::Parse(format!("quantity out of range: {}", raw)))
}

/// Decode a `newHeads` subscription payload
pub fn parse_head(value: &Value) -> ChainResult<BlockHead> {
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| ChainError::Parse(format!("head without {}", name)))
    };

    Ok(BlockHead {
        number: parse_u64(field("number")?)?,
        hash: field("hash")?.to_string(),
        parent_hash: field("parentHash")?.to_string(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    number: String,
    hash: String,
    parent_hash: String,
    #[serde(default)]
    transactions: Vec<RpcTx>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTx {
    hash: String,
    to: Option<String>,
    value: String,
    block_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcBlockRef {
    hash: String,
}

impl RpcBlock {
    fn into_chain_block(self, tip: u64) -> ChainResult<ChainBlock> {
        let height = parse_u64(&self.number)?;
        let mut transactions = Vec::with_capacity(self.transactions.len());

        for tx in self.transactions {
            let outputs = match tx.to {
                // Contract creation
                None => Vec::new(),
                Some(to) => vec![TxOutput {
                    address: to.to_ascii_lowercase(),
                    value: wei_to_units(parse_quantity(&tx.value)?),
                }],
            };
            transactions.push(ChainTx {
                txid: tx.hash,
                outputs,
            });
        }

        Ok(ChainBlock {
            hash: self.hash,
            parent_hash: Some(self.parent_hash),
            height,
            confirmations: confirmations_at(tip, height),
            transactions,
        })
    }
}

#[async_trait]
impl ChainRpc for EthereumRpcClient {
    async fn height(&self) -> ChainResult<u64> {
        let raw: String = self.rpc.call("eth_blockNumber", json!([])).await?;
        parse_u64(&raw)
    }

    async fn block_hash(&self, height: u64) -> ChainResult<String> {
        let block: Option<RpcBlockRef> = self
            .rpc
            .call_optional("eth_getBlockByNumber", json!([format!("0x{:x}", height), false]))
            .await?;
        block
            .map(|b| b.hash)
            .ok_or_else(|| ChainError::NotFound(format!("block #{}", height)))
    }

    async fn block(&self, hash: &str) -> ChainResult<ChainBlock> {
        let block = self.fetch_block(hash).await?;
        let tip = self.height().await?;
        block.into_chain_block(tip)
    }

    async fn confirmations_of(&self, tx_hash: &str) -> ChainResult<u32> {
        let tx: Option<RpcTx> = self
            .rpc
            .call_optional("eth_getTransactionByHash", json!([tx_hash]))
            .await?;

        let Some(block_number) = tx.and_then(|t| t.block_number) else {
            return Ok(0);
        };
        let height = parse_u64(&block_number)?;
        let tip = self.height().await?;
        Ok(confirmations_at(tip, height))
    }

    async fn generate_address(&self, _owner_hint: &str) -> ChainResult<String> {
        let address: String = self
            .rpc
            .call("personal_newAccount", json!([self.account_passphrase]))
            .await?;
        Ok(address.to_ascii_lowercase())
    }
}
