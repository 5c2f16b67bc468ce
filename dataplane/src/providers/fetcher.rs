//! Chain fetcher
//!
//! Retrieves block height, block bodies and gas price, and assembles the
//! ordered recent-block and recent-transaction windows. Bulk operations
//! never fail: any fetch error degrades to an empty sequence.

use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{
    providers::rpc::RpcClient,
    utils::{hex_seconds_to_millis, parse_hex_u128, parse_hex_u64, round_to, wei_to_gwei, wei_to_native},
    Block, BlockId, Result, Transaction, TxStatus,
};

/// Blocks sampled by `get_recent_transactions`
const TRANSACTION_BLOCK_WINDOW: usize = 5;

/// Block body as returned by `eth_getBlockByNumber` with full transactions
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    #[serde(default)]
    pub number: Option<String>,
    pub timestamp: String,
    pub gas_used: String,
    #[serde(default)]
    pub gas_limit: Option<String>,
    #[serde(default)]
    pub miner: Option<String>,
    #[serde(default)]
    pub transactions: Vec<RpcTransaction>,
}

/// Embedded transaction object
#[derive(Debug, Clone, Deserialize)]
pub struct RpcTransaction {
    pub hash: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    pub value: String,
    pub gas: String,
}

impl RpcBlock {
    /// Normalize into a block summary
    pub fn to_block(&self, number: u64) -> Result<Block> {
        Ok(Block {
            number,
            timestamp: hex_seconds_to_millis(&self.timestamp)?,
            transaction_count: self.transactions.len() as u64,
            gas_used: parse_hex_u64(&self.gas_used)?,
            gas_limit: self.gas_limit.as_deref().map(parse_hex_u64).transpose()?,
            miner: self.miner.clone().unwrap_or_default(),
        })
    }

    /// Normalize the first `limit` embedded transactions
    pub fn to_transactions(&self, limit: usize) -> Result<Vec<Transaction>> {
        let timestamp = hex_seconds_to_millis(&self.timestamp)?;

        self.transactions
            .iter()
            .take(limit)
            .map(|tx| {
                Ok(Transaction {
                    hash: tx.hash.clone(),
                    value: round_to(wei_to_native(parse_hex_u128(&tx.value)?), 4),
                    from: tx.from.clone(),
                    to: tx.to.clone(),
                    // Receipts are not fetched, so the outcome is not observable here
                    status: TxStatus::Success,
                    timestamp,
                    gas_used: parse_hex_u64(&tx.gas)?,
                })
            })
            .collect()
    }
}

/// Fetches raw chain entities through an RPC client
#[derive(Clone)]
pub struct ChainFetcher {
    client: RpcClient,
}

impl ChainFetcher {
    /// Create a new chain fetcher
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }

    /// Get current block height
    pub async fn get_current_block(&self) -> Result<u64> {
        let hex: String = self.client.request("eth_blockNumber", vec![]).await?;
        parse_hex_u64(&hex)
    }

    /// Get a block body with embedded transactions; `None` when the node has no such block
    pub async fn get_block(&self, id: impl Into<BlockId>) -> Result<Option<RpcBlock>> {
        let id = id.into();
        self.client
            .request("eth_getBlockByNumber", vec![json!(id.to_param()), Value::Bool(true)])
            .await
    }

    /// Get current gas price in gwei
    pub async fn get_gas_price(&self) -> Result<f64> {
        let hex: String = self.client.request("eth_gasPrice", vec![]).await?;
        Ok(wei_to_gwei(parse_hex_u128(&hex)?))
    }

    /// Fetch blocks `[current-n+1 ..= current]`, newest first.
    ///
    /// A block that fails to fetch or decode is omitted, so the result may be
    /// shorter than `count`.
    pub async fn get_recent_blocks(&self, count: u64) -> Vec<Block> {
        let current = match self.get_current_block().await {
            Ok(current) => current,
            Err(e) => {
                warn!(error = %e, "Failed to fetch recent blocks");
                return Vec::new();
            }
        };

        let numbers: Vec<u64> = (0..count)
            .filter_map(|offset| current.checked_sub(offset))
            .collect();

        let fetched = join_all(numbers.iter().map(|&number| async move {
            let body = self.get_block(number).await?;
            body.map(|b| b.to_block(number)).transpose()
        }))
        .await;

        let blocks: Vec<Block> = numbers
            .iter()
            .zip(fetched)
            .filter_map(|(number, outcome)| match outcome {
                Ok(block) => block,
                Err(e) => {
                    debug!(block = number, error = %e, "Omitting block from recent window");
                    None
                }
            })
            .collect();

        debug!(current, requested = count, fetched = blocks.len(), "Fetched recent blocks");
        blocks
    }

    /// Fetch up to `count` transactions from at most the 5 newest blocks,
    /// taking at most `ceil(count / 5)` per block.
    pub async fn get_recent_transactions(&self, count: usize) -> Vec<Transaction> {
        match self.try_recent_transactions(count).await {
            Ok(transactions) => transactions,
            Err(e) => {
                warn!(error = %e, "Failed to fetch recent transactions");
                Vec::new()
            }
        }
    }

    async fn try_recent_transactions(&self, count: usize) -> Result<Vec<Transaction>> {
        let current = self.get_current_block().await?;
        let per_block = count.div_ceil(TRANSACTION_BLOCK_WINDOW);
        let mut transactions = Vec::with_capacity(count);

        for offset in 0..TRANSACTION_BLOCK_WINDOW.min(count) as u64 {
            let Some(number) = current.checked_sub(offset) else {
                break;
            };

            if let Some(block) = self.get_block(number).await? {
                transactions.extend(block.to_transactions(per_block)?);
            }
        }

        transactions.truncate(count);
        Ok(transactions)
    }
}
