//! Injectable estimators for figures the chain does not report directly

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::PendingTxKind;
use crate::{SwapActivity, Transaction};

/// Minimum gas for a value transfer to count as a swap
pub const SWAP_GAS_THRESHOLD: u64 = 50_000;

/// Shared random source; seeded runs are reproducible
#[derive(Clone)]
pub struct SeededRng {
    inner: Arc<Mutex<StdRng>>,
}

impl SeededRng {
    /// Seeded when `seed` is set, otherwise from OS entropy
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            inner: Arc::new(Mutex::new(rng)),
        }
    }

    /// Uniform draw in `[0, 1)`
    pub fn unit(&self) -> f64 {
        self.inner.lock().gen::<f64>()
    }

    /// Uniform draw in `0..max`; zero when `max` is zero
    pub fn below(&self, max: u64) -> u64 {
        if max == 0 {
            return 0;
        }
        self.inner.lock().gen_range(0..max)
    }
}

impl std::fmt::Debug for SeededRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeededRng").finish_non_exhaustive()
    }
}

/// Pending transaction count. The node exposes no mempool size, so this is
/// either a placeholder draw or a fixed figure.
#[derive(Debug, Clone)]
pub enum PendingTxEstimator {
    Random { max: u64, rng: SeededRng },
    Fixed(u64),
}

impl PendingTxEstimator {
    pub fn from_config(kind: PendingTxKind, rng: SeededRng) -> Self {
        match kind {
            PendingTxKind::Random { max } => PendingTxEstimator::Random { max, rng },
            PendingTxKind::Fixed { value } => PendingTxEstimator::Fixed(value),
        }
    }

    pub fn estimate(&self) -> u64 {
        match self {
            PendingTxEstimator::Random { max, rng } => rng.below(*max),
            PendingTxEstimator::Fixed(value) => *value,
        }
    }
}

/// Heuristic swap detection: a transfer carrying value and more gas than a
/// plain send
pub fn is_swap(tx: &Transaction) -> bool {
    tx.value > 0.0 && tx.gas_used > SWAP_GAS_THRESHOLD
}

/// Scales swaps seen in the sampled window up to a daily estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwapExtrapolation {
    pub count_factor: u64,
    pub volume_factor: f64,
}

impl Default for SwapExtrapolation {
    fn default() -> Self {
        Self {
            count_factor: 50,
            volume_factor: 100.0,
        }
    }
}

impl SwapExtrapolation {
    /// Estimate from the transaction window; not a measured total
    pub fn estimate(&self, transactions: &[Transaction]) -> SwapActivity {
        let (count, volume) = transactions
            .iter()
            .filter(|tx| is_swap(tx))
            .fold((0u64, 0.0f64), |(count, volume), tx| (count + 1, volume + tx.value));

        SwapActivity {
            total_swaps: count.saturating_mul(self.count_factor),
            volume24h: volume * self.volume_factor,
        }
    }
}
