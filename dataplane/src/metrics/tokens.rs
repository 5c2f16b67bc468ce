//! Token pair price sources

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{MetricsConfig, TokenPriceKind};
use crate::{DataplaneError, Result, TokenPair};

/// Supplies the token pair quotes shown next to chain metrics
#[async_trait]
pub trait TokenPriceSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Current quotes; an unavailable source yields an empty list
    async fn token_pairs(&self) -> Vec<TokenPair>;
}

/// Fixed sample quotes
#[derive(Debug, Clone, Default)]
pub struct StaticSample;

#[async_trait]
impl TokenPriceSource for StaticSample {
    fn name(&self) -> &'static str {
        "static_sample"
    }

    async fn token_pairs(&self) -> Vec<TokenPair> {
        [
            ("CHOG/MON", 0.0847, 2.4, 142_000.0),
            ("YAKI/WMON", 0.1234, -0.8, 67_000.0),
            ("MON/DAK", 1.4567, 5.2, 289_000.0),
        ]
        .into_iter()
        .map(|(symbol, price, change24h, volume24h)| TokenPair {
            symbol: symbol.to_string(),
            price,
            change24h,
            volume24h,
        })
        .collect()
    }
}

/// Quotes from an HTTP price feed.
///
/// Accepts a DexScreener-style `{"pairs": [...]}` body or the proxy body
/// `{"success": true, "data": [TokenPair]}`.
#[derive(Debug, Clone)]
pub struct ExternalFeed {
    client: Client,
    url: String,
    max_pairs: usize,
}

impl ExternalFeed {
    pub fn new(url: impl Into<String>, max_pairs: usize, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataplaneError::transport(None, format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            max_pairs,
        })
    }

    async fn fetch(&self) -> Result<Vec<TokenPair>> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DataplaneError::transport(
                Some(status.as_u16()),
                format!("Price feed returned {}", status),
            ));
        }

        let body: Value = response.json().await?;
        parse_feed_body(&body, self.max_pairs)
    }
}

#[async_trait]
impl TokenPriceSource for ExternalFeed {
    fn name(&self) -> &'static str {
        "external_feed"
    }

    async fn token_pairs(&self) -> Vec<TokenPair> {
        match self.fetch().await {
            Ok(pairs) => {
                debug!(url = %self.url, pairs = pairs.len(), "Fetched token prices");
                pairs
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "Failed to fetch token prices");
                Vec::new()
            }
        }
    }
}

/// Build the configured source
pub fn price_source_from_config(config: &MetricsConfig, timeout: Duration) -> Result<Box<dyn TokenPriceSource>> {
    Ok(match config.token_prices {
        TokenPriceKind::StaticSample => Box::new(StaticSample),
        TokenPriceKind::ExternalFeed => Box::new(ExternalFeed::new(
            config.token_feed_url.clone(),
            config.token_feed_max_pairs,
            timeout,
        )?),
    })
}

/// Numbers arrive either as JSON numbers or decimal strings
fn lenient_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn symbol_of(pair: &Value, side: &str, fallback: &str) -> String {
    pair.get(side)
        .and_then(|token| token.get("symbol"))
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

/// Extract up to `max_pairs` quotes from a feed response
pub fn parse_feed_body(body: &Value, max_pairs: usize) -> Result<Vec<TokenPair>> {
    if let Some(pairs) = body.get("pairs") {
        // DexScreener answers `"pairs": null` for unknown tokens
        let Some(pairs) = pairs.as_array() else {
            return Ok(Vec::new());
        };

        return Ok(pairs
            .iter()
            .take(max_pairs)
            .map(|pair| TokenPair {
                symbol: format!(
                    "{}/{}",
                    symbol_of(pair, "baseToken", "TOKEN"),
                    symbol_of(pair, "quoteToken", "MON")
                ),
                price: lenient_f64(pair.get("priceUsd")),
                change24h: lenient_f64(pair.get("priceChange").and_then(|c| c.get("h24"))),
                volume24h: lenient_f64(pair.get("volume").and_then(|v| v.get("h24"))),
            })
            .collect());
    }

    if let Some(data) = body.get("data") {
        if body.get("success").and_then(Value::as_bool) == Some(false) {
            return Err(DataplaneError::protocol(None, "Price proxy reported failure"));
        }
        let mut pairs: Vec<TokenPair> = serde_json::from_value(data.clone())?;
        pairs.truncate(max_pairs);
        return Ok(pairs);
    }

    Err(DataplaneError::parse("Unrecognized price feed body"))
}
