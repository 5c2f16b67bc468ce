//! # Safari Dataplane
//!
//! Data-acquisition and derived-metrics engine for the Monanimal Safari
//! dashboard. Pulls raw JSON-RPC responses from the chain, turns them into
//! one consistent snapshot per poll cycle, and keeps a resilient realtime
//! socket open for live block-head notifications.

pub mod config;
pub mod error;
pub mod types;
pub mod providers;
pub mod metrics;
pub mod dashboard;
pub mod utils;

// Re-export commonly used types
pub use config::DataplaneConfig;
pub use error::{DataplaneError, Result};
pub use types::*;

/// Current version of the dataplane
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Dataplane identifier
pub const SYSTEM_NAME: &str = "safari-dataplane";

/// Dataplane operational modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationalMode {
    /// Development mode with verbose logging
    Development,

    /// Production mode with quieter logging
    Production,
}

impl OperationalMode {
    /// Get the default log level for this mode
    pub fn log_level(&self) -> &'static str {
        match self {
            OperationalMode::Development => "debug",
            OperationalMode::Production => "info",
        }
    }
}

impl std::str::FromStr for OperationalMode {
    type Err = DataplaneError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(OperationalMode::Development),
            "production" | "prod" => Ok(OperationalMode::Production),
            _ => Err(DataplaneError::internal(format!("Invalid operational mode: {}", s))),
        }
    }
}
