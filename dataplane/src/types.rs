//! Core data types shared by the fetcher, aggregator and realtime manager

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::{hex_seconds_to_millis, parse_hex_u64};

/// Block identifier - a concrete number or a JSON-RPC tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockId {
    Number(u64),
    Latest,
    Earliest,
    Pending,
}

impl BlockId {
    /// Render as the `eth_getBlockByNumber` parameter
    pub fn to_param(&self) -> String {
        match self {
            BlockId::Number(n) => format!("0x{:x}", n),
            BlockId::Latest => "latest".to_string(),
            BlockId::Earliest => "earliest".to_string(),
            BlockId::Pending => "pending".to_string(),
        }
    }
}

impl From<u64> for BlockId {
    fn from(number: u64) -> Self {
        BlockId::Number(number)
    }
}

/// Normalized block summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub number: u64,
    /// Millisecond epoch
    pub timestamp: i64,
    pub transaction_count: u64,
    pub gas_used: u64,
    /// Absent when the node does not report it
    pub gas_limit: Option<u64>,
    pub miner: String,
}

/// Transaction outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Failed,
}

/// Normalized transaction summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: String,
    /// Native-token units, rounded to 4 decimals
    pub value: f64,
    pub from: String,
    pub to: Option<String>,
    pub status: TxStatus,
    /// Millisecond epoch of the containing block
    pub timestamp: i64,
    pub gas_used: u64,
}

/// Network health derived from average block time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkHealth {
    Excellent,
    Good,
    Slow,
}

impl NetworkHealth {
    /// Classify an average block time given in seconds
    pub fn from_block_time(avg_block_time: f64) -> Self {
        if avg_block_time > 3.0 {
            NetworkHealth::Slow
        } else if avg_block_time > 2.5 {
            NetworkHealth::Good
        } else {
            NetworkHealth::Excellent
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMetrics {
    pub block_height: u64,
    pub tps: f64,
    pub avg_tps: f64,
    /// Gwei
    pub gas_price: f64,
    /// Oldest first
    pub gas_price_history: Vec<f64>,
    /// Seconds
    pub avg_block_time: f64,
    pub pending_tx: u64,
    pub validator_count: u32,
    pub health: NetworkHealth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMetrics {
    pub total_transactions: u64,
    pub tps: f64,
    pub volume: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMetrics {
    pub avg_block_time: f64,
    pub blocks_per_minute: f64,
    pub last_block_time: f64,
}

/// Trading pair quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub symbol: String,
    pub price: f64,
    pub change24h: f64,
    pub volume24h: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetrics {
    pub current_gas_price: f64,
    pub gas_used24h: u64,
    pub token_pairs: Vec<TokenPair>,
}

/// Swap activity estimate.
///
/// Both fields are coarse extrapolations from a small transaction window,
/// not measured totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapActivity {
    pub total_swaps: u64,
    pub volume24h: f64,
}

/// One immutable bundle of every derived metric as of a single assembly instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub current_block: u64,
    pub network_metrics: NetworkMetrics,
    pub transaction_metrics: TransactionMetrics,
    pub block_metrics: BlockMetrics,
    pub token_metrics: TokenMetrics,
    pub swap_activity: SwapActivity,
    pub recent_transactions: Vec<Transaction>,
    pub recent_blocks: Vec<Block>,
    /// Millisecond epoch of assembly
    pub last_updated: i64,
}

/// Realtime socket state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        };
        write!(f, "{}", name)
    }
}

/// Inbound realtime frame wrapped with its kind and receipt time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
    /// Millisecond epoch of receipt
    pub timestamp: i64,
}

impl RealtimeMessage {
    /// Wrap a parsed frame.
    ///
    /// Subscription frames are keyed by `method` and carry their payload in
    /// `params`; other frames fall back to their own `type` field, so a
    /// `{"type":"welcome"}` greeting is kept as `welcome`. Frames with
    /// neither field are `unknown`.
    pub fn from_frame(frame: Value, timestamp: i64) -> Self {
        let kind = frame
            .get("method")
            .or_else(|| frame.get("type"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let data = match frame.get("params") {
            Some(params) => params.clone(),
            None => frame,
        };

        Self { kind, data, timestamp }
    }

    /// Decode a `newHeads` subscription payload
    pub fn new_head(&self) -> Option<NewHead> {
        if self.kind != "eth_subscription" {
            return None;
        }

        let result = self.data.get("result")?;
        let number = parse_hex_u64(result.get("number")?.as_str()?).ok()?;
        let timestamp = hex_seconds_to_millis(result.get("timestamp")?.as_str()?).ok()?;
        let gas_used = result
            .get("gasUsed")
            .and_then(Value::as_str)
            .and_then(|v| parse_hex_u64(v).ok())
            .unwrap_or(0);
        let transaction_count = match result.get("transactionCount") {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            Some(Value::String(s)) => parse_hex_u64(s).unwrap_or(0),
            _ => 0,
        };

        Some(NewHead {
            subscription: self
                .data
                .get("subscription")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            number,
            timestamp,
            gas_used,
            transaction_count,
        })
    }
}

/// Live block-head notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHead {
    pub subscription: String,
    pub number: u64,
    pub timestamp: i64,
    pub gas_used: u64,
    pub transaction_count: u64,
}
