//! Dashboard orchestrator
//!
//! One call, one snapshot: fan out the four chain fetches, join them, run
//! the aggregator over the joined results and stamp the assembly time.
//! Any failure aborts the whole cycle, so a partial snapshot never leaves
//! this module.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    config::{DataplaneConfig, PollingConfig},
    metrics::{price_source_from_config, MetricsAggregator, TokenPriceSource},
    providers::{ChainFetcher, RpcClient},
    utils::now_millis,
    DashboardSnapshot, DataplaneError, Result,
};

/// Anything that can produce a complete dashboard snapshot
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    async fn fetch_snapshot(&self) -> Result<DashboardSnapshot>;
}

pub struct DashboardOrchestrator {
    fetcher: ChainFetcher,
    aggregator: MetricsAggregator,
    prices: Arc<dyn TokenPriceSource>,
    recent_blocks: u64,
    recent_transactions: usize,
}

impl DashboardOrchestrator {
    pub fn new(
        fetcher: ChainFetcher,
        aggregator: MetricsAggregator,
        prices: Arc<dyn TokenPriceSource>,
        polling: &PollingConfig,
    ) -> Self {
        Self {
            fetcher,
            aggregator,
            prices,
            recent_blocks: polling.recent_blocks,
            recent_transactions: polling.recent_transactions,
        }
    }

    /// Wire the HTTP client, aggregator and price source from configuration
    pub fn from_config(config: &DataplaneConfig) -> Result<Self> {
        let client = RpcClient::http(&config.rpc)?;
        let prices = price_source_from_config(&config.metrics, Duration::from_secs(config.rpc.timeout_seconds))?;

        info!(
            rpc = %config.rpc.http_url,
            gas_history = ?config.metrics.gas_history,
            token_prices = ?config.metrics.token_prices,
            "Dashboard orchestrator configured"
        );

        Ok(Self::new(
            ChainFetcher::new(client),
            MetricsAggregator::from_config(&config.metrics),
            Arc::from(prices),
            &config.polling,
        ))
    }

    /// Assemble one snapshot
    pub async fn get_dashboard_data(&self) -> Result<DashboardSnapshot> {
        let (current_block, gas_price, recent_blocks, recent_transactions) = tokio::try_join!(
            self.fetcher.get_current_block(),
            self.fetcher.get_gas_price(),
            async { Ok::<_, DataplaneError>(self.fetcher.get_recent_blocks(self.recent_blocks).await) },
            async { Ok::<_, DataplaneError>(self.fetcher.get_recent_transactions(self.recent_transactions).await) },
        )?;

        let network_metrics = self
            .aggregator
            .calculate_network_metrics(&recent_blocks, current_block, gas_price)?;

        let transaction_metrics = self
            .aggregator
            .calculate_transaction_metrics(&recent_transactions, network_metrics.tps);
        let block_metrics = self
            .aggregator
            .calculate_block_metrics(&recent_blocks, network_metrics.avg_block_time);

        let token_pairs = self.prices.token_pairs().await;
        let token_metrics = self
            .aggregator
            .calculate_token_metrics(gas_price, &recent_blocks, token_pairs);
        let swap_activity = self.aggregator.calculate_swap_activity(&recent_transactions);

        debug!(
            block = current_block,
            blocks = recent_blocks.len(),
            transactions = recent_transactions.len(),
            price_source = self.prices.name(),
            "Assembled dashboard snapshot"
        );

        Ok(DashboardSnapshot {
            current_block,
            network_metrics,
            transaction_metrics,
            block_metrics,
            token_metrics,
            swap_activity,
            recent_transactions,
            recent_blocks,
            last_updated: now_millis(),
        })
    }
}

#[async_trait]
impl SnapshotSource for DashboardOrchestrator {
    async fn fetch_snapshot(&self) -> Result<DashboardSnapshot> {
        self.get_dashboard_data().await
    }
}
