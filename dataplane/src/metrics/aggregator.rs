//! Metrics aggregator
//!
//! Pure derivations over one cycle's joined fetch results. Blocks are
//! always newest-first; every figure is computed from the same inputs so a
//! snapshot is consistent as of a single assembly instant.

use tracing::debug;

use crate::config::MetricsConfig;
use crate::metrics::estimators::{PendingTxEstimator, SeededRng, SwapExtrapolation};
use crate::metrics::gas::GasHistoryStrategy;
use crate::utils::simple_moving_average;
use crate::{
    Block, BlockMetrics, DataplaneError, NetworkHealth, NetworkMetrics, Result, SwapActivity, TokenMetrics, TokenPair,
    Transaction, TransactionMetrics, TxStatus,
};

/// Block time assumed when the window yields no usable delta, in seconds
pub const DEFAULT_BLOCK_TIME: f64 = 2.0;

/// Blocks whose transactions count toward TPS
pub const TPS_WINDOW_BLOCKS: usize = 5;

/// `avgTps = tps * AVG_TPS_FACTOR`
pub const AVG_TPS_FACTOR: f64 = 0.9;

/// Positive deltas between adjacent newest-first timestamps, in seconds
pub fn block_time_deltas(blocks: &[Block]) -> Vec<f64> {
    blocks
        .windows(2)
        .map(|pair| (pair[0].timestamp - pair[1].timestamp) as f64 / 1000.0)
        .filter(|delta| *delta > 0.0)
        .collect()
}

/// Mean of the positive deltas, or [`DEFAULT_BLOCK_TIME`] when none remain
pub fn average_block_time(blocks: &[Block]) -> f64 {
    let deltas = block_time_deltas(blocks);
    if deltas.is_empty() {
        DEFAULT_BLOCK_TIME
    } else {
        simple_moving_average(&deltas)
    }
}

/// Transactions in the newest five blocks over the span of the whole window.
///
/// A single block spans `avg_block_time`. A non-positive span yields zero.
pub fn transactions_per_second(blocks: &[Block], avg_block_time: f64) -> f64 {
    let recent: u64 = blocks
        .iter()
        .take(TPS_WINDOW_BLOCKS)
        .map(|block| block.transaction_count)
        .sum();

    let window = match (blocks.first(), blocks.last()) {
        (Some(newest), Some(oldest)) if blocks.len() > 1 => (newest.timestamp - oldest.timestamp) as f64 / 1000.0,
        _ => avg_block_time * blocks.len() as f64,
    };

    if window > 0.0 {
        recent as f64 / window
    } else {
        0.0
    }
}

/// Derives every dashboard metric from fetched chain data
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    gas_history: GasHistoryStrategy,
    pending_tx: PendingTxEstimator,
    swaps: SwapExtrapolation,
    validator_count: u32,
    transaction_extrapolation: u64,
}

impl MetricsAggregator {
    pub fn new(
        gas_history: GasHistoryStrategy,
        pending_tx: PendingTxEstimator,
        swaps: SwapExtrapolation,
        validator_count: u32,
        transaction_extrapolation: u64,
    ) -> Self {
        Self {
            gas_history,
            pending_tx,
            swaps,
            validator_count,
            transaction_extrapolation,
        }
    }

    /// Build from configuration; jitter and pending draws share one RNG
    pub fn from_config(config: &MetricsConfig) -> Self {
        let rng = SeededRng::new(config.rng_seed);

        Self::new(
            GasHistoryStrategy::from_config(config, rng.clone()),
            PendingTxEstimator::from_config(config.pending_tx, rng),
            SwapExtrapolation {
                count_factor: config.swap_count_factor,
                volume_factor: config.swap_volume_factor,
            },
            config.validator_count,
            config.transaction_extrapolation,
        )
    }

    /// Network metrics from newest-first `blocks`.
    ///
    /// Fails with `InsufficientData` when `blocks` is empty.
    pub fn calculate_network_metrics(&self, blocks: &[Block], block_height: u64, gas_price: f64) -> Result<NetworkMetrics> {
        if blocks.is_empty() {
            return Err(DataplaneError::insufficient_data(
                "No recent blocks available for metrics calculation",
            ));
        }

        let avg_block_time = average_block_time(blocks);
        let tps = transactions_per_second(blocks, avg_block_time);
        let health = NetworkHealth::from_block_time(avg_block_time);

        debug!(
            blocks = blocks.len(),
            avg_block_time,
            tps,
            strategy = self.gas_history.name(),
            "Calculated network metrics"
        );

        Ok(NetworkMetrics {
            block_height,
            tps,
            avg_tps: tps * AVG_TPS_FACTOR,
            gas_price,
            gas_price_history: self.gas_history.history(gas_price, blocks),
            avg_block_time,
            pending_tx: self.pending_tx.estimate(),
            validator_count: self.validator_count,
            health,
        })
    }

    /// Transaction metrics over the sampled window.
    ///
    /// `total_transactions` is an extrapolation, not a chain total.
    pub fn calculate_transaction_metrics(&self, transactions: &[Transaction], tps: f64) -> TransactionMetrics {
        let succeeded = transactions
            .iter()
            .filter(|tx| tx.status == TxStatus::Success)
            .count();
        let success_rate = if transactions.is_empty() {
            1.0
        } else {
            succeeded as f64 / transactions.len() as f64
        };

        TransactionMetrics {
            total_transactions: (transactions.len() as u64).saturating_mul(self.transaction_extrapolation),
            tps,
            volume: transactions.iter().map(|tx| tx.value).sum(),
            success_rate,
        }
    }

    pub fn calculate_block_metrics(&self, blocks: &[Block], avg_block_time: f64) -> BlockMetrics {
        let last_block_time = match blocks {
            [newest, previous, ..] => (newest.timestamp - previous.timestamp) as f64 / 1000.0,
            _ => avg_block_time,
        };

        BlockMetrics {
            avg_block_time,
            blocks_per_minute: 60.0 / avg_block_time,
            last_block_time,
        }
    }

    pub fn calculate_token_metrics(&self, gas_price: f64, blocks: &[Block], token_pairs: Vec<TokenPair>) -> TokenMetrics {
        TokenMetrics {
            current_gas_price: gas_price,
            gas_used24h: blocks.iter().map(|block| block.gas_used).sum(),
            token_pairs,
        }
    }

    /// Swap estimate from the transaction window
    pub fn calculate_swap_activity(&self, transactions: &[Transaction]) -> SwapActivity {
        self.swaps.estimate(transactions)
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::from_config(&MetricsConfig::default())
    }
}
