//! Utility functions and helpers for the dataplane

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::{DataplaneError, Result};

const WEI_PER_GWEI: f64 = 1e9;
const WEI_PER_NATIVE: f64 = 1e18;

/// Exponential backoff capped at a maximum delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// `min(base * 2^attempt, max)`
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            max: Duration::from_millis(30_000),
        }
    }
}

/// Retry configuration for operations
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

/// Retry a future with exponential backoff.
///
/// Errors that are not retryable (authentication failures) surface on the
/// first occurrence.
pub async fn retry_with_backoff<F, Fut, T>(
    operation: F,
    config: RetryConfig,
    operation_name: &str,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        operation = operation_name,
                        retries = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) if !error.is_retryable() => {
                warn!(
                    operation = operation_name,
                    category = error.category(),
                    error = %error,
                    "Operation failed with non-retryable error"
                );
                return Err(error);
            }
            Err(error) if attempt >= config.max_retries => {
                warn!(
                    operation = operation_name,
                    retries = attempt,
                    error = %error,
                    "Operation failed after all retry attempts"
                );
                return Err(error);
            }
            Err(error) => {
                let delay = config.backoff.delay(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Operation failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

/// Parse a `0x`-prefixed quantity into a u64
pub fn parse_hex_u64(value: &str) -> Result<u64> {
    let digits = strip_hex_prefix(value);
    if digits.is_empty() {
        return Err(DataplaneError::parse(format!("Empty hex quantity: {:?}", value)));
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| DataplaneError::parse(format!("Invalid hex quantity {:?}: {}", value, e)))
}

/// Parse a `0x`-prefixed quantity into a u128 (wei amounts)
pub fn parse_hex_u128(value: &str) -> Result<u128> {
    let digits = strip_hex_prefix(value);
    if digits.is_empty() {
        return Err(DataplaneError::parse(format!("Empty hex quantity: {:?}", value)));
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| DataplaneError::parse(format!("Invalid hex quantity {:?}: {}", value, e)))
}

/// Convert a hex second timestamp to a millisecond epoch
pub fn hex_seconds_to_millis(value: &str) -> Result<i64> {
    let seconds = parse_hex_u64(value)?;
    i64::try_from(seconds)
        .ok()
        .and_then(|s| s.checked_mul(1000))
        .ok_or_else(|| DataplaneError::parse(format!("Timestamp out of range: {}", value)))
}

/// Convert Wei to Gwei
pub fn wei_to_gwei(wei: u128) -> f64 {
    wei as f64 / WEI_PER_GWEI
}

/// Convert Wei to native-token units
pub fn wei_to_native(wei: u128) -> f64 {
    wei as f64 / WEI_PER_NATIVE
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Current wall-clock time as a millisecond epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Simple arithmetic mean, zero for an empty slice
pub fn simple_moving_average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
