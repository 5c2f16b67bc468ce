//! Configuration management for the dataplane

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::utils::{Backoff, RetryConfig};
use crate::OperationalMode;

/// Main configuration structure for the dataplane
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataplaneConfig {
    /// Global settings
    pub global: GlobalConfig,

    /// JSON-RPC endpoint
    pub rpc: RpcConfig,

    /// Dashboard polling policy
    pub polling: PollingConfig,

    /// Realtime socket
    pub realtime: RealtimeConfig,

    /// Metric derivation strategies
    pub metrics: MetricsConfig,
}

/// Global dataplane settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Operational mode
    pub mode: OperationalMode,

    /// Log level (trace, debug, info, warn, error); the mode's level when unset
    pub log_level: Option<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            mode: OperationalMode::Development,
            log_level: None,
        }
    }
}

/// JSON-RPC endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// HTTP(S) JSON-RPC URL
    pub http_url: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            http_url: "https://testnet-rpc.monad.xyz".to_string(),
            timeout_seconds: 10,
        }
    }
}

/// Polling policy for dashboard snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Refresh automatically on a fixed interval
    pub auto_refresh: bool,

    /// Poll interval in milliseconds
    pub interval_ms: u64,

    /// Retries per cycle after the first attempt
    pub max_retries: u32,

    /// Retry backoff base in milliseconds
    pub retry_base_delay_ms: u64,

    /// Retry backoff cap in milliseconds
    pub retry_max_delay_ms: u64,

    /// Blocks fetched per cycle
    pub recent_blocks: u64,

    /// Transactions fetched per cycle
    pub recent_transactions: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            auto_refresh: true,
            interval_ms: 3000,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 30_000,
            recent_blocks: 10,
            recent_transactions: 20,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            backoff: Backoff::new(
                Duration::from_millis(self.retry_base_delay_ms),
                Duration::from_millis(self.retry_max_delay_ms),
            ),
        }
    }
}

/// Realtime connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Enable the realtime connection
    pub enabled: bool,

    /// WebSocket URL
    pub ws_url: String,

    /// Reconnect attempts before going idle
    pub max_reconnect_attempts: u32,

    /// Reconnect backoff base in milliseconds
    pub reconnect_base_delay_ms: u64,

    /// Reconnect backoff cap in milliseconds
    pub reconnect_max_delay_ms: u64,

    /// Messages kept in history
    pub history_capacity: usize,

    /// Send `eth_subscribe ["newHeads"]` after the socket opens
    pub subscribe_new_heads: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ws_url: "ws://localhost:5000/ws".to_string(),
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 30_000,
            history_capacity: 100,
            subscribe_new_heads: false,
        }
    }
}

impl RealtimeConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.reconnect_base_delay_ms),
            Duration::from_millis(self.reconnect_max_delay_ms),
        )
    }
}

/// How the gas price history series is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GasHistoryKind {
    /// Scale the current price by each block's gas utilization
    UtilizationWeighted,

    /// Degraded mode: bounded random jitter around the current price
    RandomJitter,
}

/// Where token pair quotes come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPriceKind {
    StaticSample,
    ExternalFeed,
}

/// Pending transaction estimator selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingTxKind {
    /// Uniform draw in `0..max`
    Random { max: u64 },

    /// Constant value
    Fixed { value: u64 },
}

/// Metric derivation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub gas_history: GasHistoryKind,

    /// Gas limit assumed for blocks that do not report one
    pub assumed_gas_limit: u64,

    /// Blocks considered by the utilization-weighted history
    pub gas_history_max_blocks: usize,

    /// Jitter amplitude in gwei
    pub jitter_amplitude: f64,

    /// Samples produced by the jitter history
    pub jitter_samples: usize,

    pub token_prices: TokenPriceKind,

    /// Price feed URL for the external source
    pub token_feed_url: String,

    /// Pairs kept from the external feed
    pub token_feed_max_pairs: usize,

    pub validator_count: u32,

    pub pending_tx: PendingTxKind,

    /// Multiplier applied to the sampled transaction count
    pub transaction_extrapolation: u64,

    /// Multiplier applied to the sampled swap count
    pub swap_count_factor: u64,

    /// Multiplier applied to the sampled swap volume
    pub swap_volume_factor: f64,

    /// Seed for jitter and random estimators; entropy when unset
    pub rng_seed: Option<u64>,
}

impl MetricsConfig {
    /// Static token prices, jittered gas history, 156 validators
    pub fn sample_profile() -> Self {
        Self {
            gas_history: GasHistoryKind::RandomJitter,
            token_prices: TokenPriceKind::StaticSample,
            validator_count: 156,
            ..Self::live_profile()
        }
    }

    /// External price feed, utilization-weighted gas history, 99 validators
    pub fn live_profile() -> Self {
        Self {
            gas_history: GasHistoryKind::UtilizationWeighted,
            assumed_gas_limit: 30_000_000,
            gas_history_max_blocks: 30,
            jitter_amplitude: 5.0,
            jitter_samples: 10,
            token_prices: TokenPriceKind::ExternalFeed,
            token_feed_url: "https://api.dexscreener.com/latest/dex/tokens/monad".to_string(),
            token_feed_max_pairs: 3,
            validator_count: 99,
            pending_tx: PendingTxKind::Random { max: 100 },
            transaction_extrapolation: 100,
            swap_count_factor: 50,
            swap_volume_factor: 100.0,
            rng_seed: None,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self::live_profile()
    }
}

impl DataplaneConfig {
    /// Load configuration from files and environment
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(File::with_name("config/dataplane").required(false))
            .add_source(File::with_name(&format!(
                "config/dataplane-{}",
                std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into())
            )).required(false));

        // A file named on the command line must exist
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        let config = builder
            // Add environment variables with DATAPLANE_ prefix
            .add_source(Environment::with_prefix("DATAPLANE").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if Url::parse(&self.rpc.http_url).is_err() {
            return Err(ConfigError::Message(format!(
                "Invalid RPC URL: {}", self.rpc.http_url
            )));
        }

        if self.polling.interval_ms == 0 {
            return Err(ConfigError::Message("polling.interval_ms must be greater than 0".into()));
        }

        if self.polling.retry_base_delay_ms == 0 {
            return Err(ConfigError::Message("polling.retry_base_delay_ms must be greater than 0".into()));
        }

        if self.realtime.enabled {
            if Url::parse(&self.realtime.ws_url).is_err() {
                return Err(ConfigError::Message(format!(
                    "Invalid WebSocket URL: {}", self.realtime.ws_url
                )));
            }

            if self.realtime.history_capacity == 0 {
                return Err(ConfigError::Message("realtime.history_capacity must be greater than 0".into()));
            }

            if self.realtime.reconnect_base_delay_ms == 0 {
                return Err(ConfigError::Message("realtime.reconnect_base_delay_ms must be greater than 0".into()));
            }
        }

        if self.metrics.token_prices == TokenPriceKind::ExternalFeed
            && Url::parse(&self.metrics.token_feed_url).is_err()
        {
            return Err(ConfigError::Message(format!(
                "Invalid token feed URL: {}", self.metrics.token_feed_url
            )));
        }

        if self.metrics.assumed_gas_limit == 0 {
            return Err(ConfigError::Message("metrics.assumed_gas_limit must be greater than 0".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DataplaneConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.polling.interval(), Duration::from_millis(3000));
        assert_eq!(config.polling.retry().max_retries, 3);
        assert_eq!(config.realtime.history_capacity, 100);
    }

    #[test]
    fn test_profiles_differ_on_open_variants() {
        let sample = MetricsConfig::sample_profile();
        let live = MetricsConfig::live_profile();

        assert_eq!(sample.validator_count, 156);
        assert_eq!(sample.gas_history, GasHistoryKind::RandomJitter);
        assert_eq!(sample.token_prices, TokenPriceKind::StaticSample);
        assert_eq!(live.validator_count, 99);
        assert_eq!(live.gas_history, GasHistoryKind::UtilizationWeighted);
        assert_eq!(live.token_prices, TokenPriceKind::ExternalFeed);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DataplaneConfig::default();
        config.rpc.http_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = DataplaneConfig::default();
        config.polling.interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = DataplaneConfig::default();
        config.realtime.history_capacity = 0;
        assert!(config.validate().is_err());

        config.realtime.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_explicit_config_file_is_an_error() {
        let result = DataplaneConfig::load(Some("config/does-not-exist-dataplane.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_partial_toml_overrides_defaults() {
        let config: DataplaneConfig = Config::builder()
            .add_source(File::from_str(
                "[polling]\ninterval_ms = 5000\n[metrics]\ngas_history = \"random_jitter\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.polling.interval_ms, 5000);
        assert_eq!(config.polling.max_retries, 3);
        assert_eq!(config.metrics.gas_history, GasHistoryKind::RandomJitter);
        assert_eq!(config.metrics.validator_count, 99);
    }
}
