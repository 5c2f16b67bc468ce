//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use safari_dataplane::{
    config::{MetricsConfig, PendingTxKind, PollingConfig},
    dashboard::DashboardOrchestrator,
    metrics::{MetricsAggregator, StaticSample},
    providers::{ChainFetcher, JsonRpcRequest, RpcClient, RpcTransport},
    utils::parse_hex_u64,
    DataplaneError, Result,
};

/// Genesis timestamp of the fake chain, in seconds
pub const GENESIS_SECONDS: u64 = 1_700_000_000;

/// In-memory chain answering the three consumed JSON-RPC methods
pub struct FakeChain {
    pub head: u64,
    pub block_time_secs: u64,
    pub txs_per_block: usize,
    /// Transaction value in wei
    pub tx_value_wei: u128,
    pub tx_gas: u64,
    pub gas_used: u64,
    pub gas_limit: Option<u64>,
    pub gas_price_wei: u128,
    /// Methods answered with this error instead of a result
    pub failing: HashMap<&'static str, fn() -> DataplaneError>,
    /// Every block lookup returns `null`
    pub empty: bool,
    pub requests: Mutex<Vec<String>>,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self {
            head: 1_000,
            block_time_secs: 2,
            txs_per_block: 4,
            tx_value_wei: 500_000_000_000_000_000,
            tx_gas: 120_000,
            gas_used: 15_000_000,
            gas_limit: Some(30_000_000),
            gas_price_wei: 1_000_000_000,
            failing: HashMap::new(),
            empty: false,
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl FakeChain {
    pub fn failing(mut self, method: &'static str, error: fn() -> DataplaneError) -> Self {
        self.failing.insert(method, error);
        self
    }

    pub fn request_count(&self, method: &str) -> usize {
        self.requests.lock().iter().filter(|m| m.as_str() == method).count()
    }

    pub fn block_body(&self, number: u64) -> Value {
        let timestamp = GENESIS_SECONDS + number * self.block_time_secs;
        let transactions: Vec<Value> = (0..self.txs_per_block)
            .map(|i| {
                json!({
                    "hash": format!("0x{:064x}", number * 1_000 + i as u64),
                    "from": "0x00000000000000000000000000000000000000aa",
                    "to": "0x00000000000000000000000000000000000000bb",
                    "value": format!("0x{:x}", self.tx_value_wei),
                    "gas": format!("0x{:x}", self.tx_gas)
                })
            })
            .collect();

        let mut body = json!({
            "number": format!("0x{:x}", number),
            "timestamp": format!("0x{:x}", timestamp),
            "gasUsed": format!("0x{:x}", self.gas_used),
            "miner": "0x00000000000000000000000000000000000000cc",
            "transactions": transactions
        });
        if let Some(limit) = self.gas_limit {
            body["gasLimit"] = json!(format!("0x{:x}", limit));
        }
        body
    }
}

#[async_trait]
impl RpcTransport for FakeChain {
    fn name(&self) -> &str {
        "fake-chain"
    }

    async fn send(&self, request: &JsonRpcRequest) -> Result<String> {
        self.requests.lock().push(request.method.clone());

        if let Some(error) = self.failing.get(request.method.as_str()) {
            return Err(error());
        }

        let result = match request.method.as_str() {
            "eth_blockNumber" => json!(format!("0x{:x}", self.head)),
            "eth_gasPrice" => json!(format!("0x{:x}", self.gas_price_wei)),
            "eth_getBlockByNumber" => {
                let number = request.params[0]
                    .as_str()
                    .map(parse_hex_u64)
                    .transpose()?
                    .unwrap_or(self.head);
                if self.empty || number > self.head {
                    Value::Null
                } else {
                    self.block_body(number)
                }
            }
            other => {
                return Ok(json!({
                    "jsonrpc": "2.0",
                    "id": request.id,
                    "error": {"code": -32601, "message": format!("method {} not found", other)}
                })
                .to_string())
            }
        };

        Ok(json!({"jsonrpc": "2.0", "id": request.id, "result": result}).to_string())
    }
}

/// Deterministic metrics configuration: fixed pending count, seeded RNG
pub fn test_metrics_config() -> MetricsConfig {
    MetricsConfig {
        pending_tx: PendingTxKind::Fixed { value: 12 },
        rng_seed: Some(42),
        ..MetricsConfig::live_profile()
    }
}

/// Orchestrator over a fake chain with static token prices
pub fn orchestrator(chain: Arc<FakeChain>) -> DashboardOrchestrator {
    DashboardOrchestrator::new(
        ChainFetcher::new(RpcClient::new(chain)),
        MetricsAggregator::from_config(&test_metrics_config()),
        Arc::new(StaticSample),
        &PollingConfig::default(),
    )
}
