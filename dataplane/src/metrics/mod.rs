//! Derived metrics
//!
//! Turns fetched blocks and transactions into the figures shown on the
//! dashboard. The gas history strategy, token price source and estimators
//! are chosen by configuration.

pub mod aggregator;
pub mod estimators;
pub mod gas;
pub mod tokens;

// Re-export commonly used types
pub use aggregator::{average_block_time, transactions_per_second, MetricsAggregator};
pub use estimators::{PendingTxEstimator, SeededRng, SwapExtrapolation};
pub use gas::GasHistoryStrategy;
pub use tokens::{price_source_from_config, ExternalFeed, StaticSample, TokenPriceSource};
