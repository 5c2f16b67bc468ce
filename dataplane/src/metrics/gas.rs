//! Gas price history derivation
//!
//! The node only reports the current gas price, so the history series is
//! reconstructed from the recent block window. Two strategies exist:
//!
//! - `UtilizationWeighted` scales the current price by each block's
//!   `gasUsed / gasLimit`, the canonical path.
//! - `RandomJitter` spreads samples around the current price. Degraded mode,
//!   only used when configured.

use crate::config::{GasHistoryKind, MetricsConfig};
use crate::metrics::estimators::SeededRng;
use crate::Block;

/// Price multiplier at zero utilization
const UTILIZATION_FLOOR: f64 = 0.8;

/// Additional multiplier at full utilization
const UTILIZATION_SPAN: f64 = 0.4;

#[derive(Debug, Clone)]
pub enum GasHistoryStrategy {
    UtilizationWeighted {
        /// Used for blocks that report no gas limit
        assumed_gas_limit: u64,
        max_blocks: usize,
    },
    RandomJitter {
        samples: usize,
        amplitude: f64,
        rng: SeededRng,
    },
}

impl GasHistoryStrategy {
    pub fn from_config(config: &MetricsConfig, rng: SeededRng) -> Self {
        match config.gas_history {
            GasHistoryKind::UtilizationWeighted => GasHistoryStrategy::UtilizationWeighted {
                assumed_gas_limit: config.assumed_gas_limit,
                max_blocks: config.gas_history_max_blocks,
            },
            GasHistoryKind::RandomJitter => GasHistoryStrategy::RandomJitter {
                samples: config.jitter_samples,
                amplitude: config.jitter_amplitude,
                rng,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GasHistoryStrategy::UtilizationWeighted { .. } => "utilization_weighted",
            GasHistoryStrategy::RandomJitter { .. } => "random_jitter",
        }
    }

    /// Build the series oldest-first from newest-first `blocks`
    pub fn history(&self, gas_price: f64, blocks: &[Block]) -> Vec<f64> {
        match self {
            GasHistoryStrategy::UtilizationWeighted {
                assumed_gas_limit,
                max_blocks,
            } => {
                let mut series: Vec<f64> = blocks
                    .iter()
                    .take(*max_blocks)
                    .map(|block| {
                        let limit = block
                            .gas_limit
                            .filter(|limit| *limit > 0)
                            .unwrap_or(*assumed_gas_limit)
                            .max(1);
                        let utilization = block.gas_used as f64 / limit as f64;
                        gas_price * (UTILIZATION_FLOOR + utilization * UTILIZATION_SPAN)
                    })
                    .collect();
                series.reverse();
                series
            }
            GasHistoryStrategy::RandomJitter {
                samples,
                amplitude,
                rng,
            } => (0..*samples)
                .map(|_| gas_price + (rng.unit() - 0.5) * amplitude)
                .collect(),
        }
    }
}
