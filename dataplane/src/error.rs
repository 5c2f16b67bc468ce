//! Error types for the dataplane

use thiserror::Error;

/// Result type alias for dataplane operations
pub type Result<T> = std::result::Result<T, DataplaneError>;

/// Error taxonomy for fetching, aggregation and realtime operations
#[derive(Error, Debug)]
pub enum DataplaneError {
    #[error("Transport error{}: {message}", status_suffix(.status))]
    Transport { status: Option<u16>, message: String },

    #[error("RPC error: {message}")]
    Protocol { code: Option<i64>, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Authentication failed (HTTP {status})")]
    Auth { status: u16 },

    #[error("Realtime connection is not open")]
    NotConnected,

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl From<serde_json::Error> for DataplaneError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for DataplaneError {
    fn from(err: reqwest::Error) -> Self {
        match err.status().map(|s| s.as_u16()) {
            Some(status @ (401 | 403)) => Self::Auth { status },
            _ if err.is_decode() => Self::Parse(err.to_string()),
            status => Self::Transport {
                status,
                message: err.to_string(),
            },
        }
    }
}

impl DataplaneError {
    /// Create a new transport error
    pub fn transport<S: Into<String>>(status: Option<u16>, message: S) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    /// Create a new protocol (RPC-level) error
    pub fn protocol<S: Into<String>>(code: Option<i64>, message: S) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    /// Create a new parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new insufficient data error
    pub fn insufficient_data<S: Into<String>>(message: S) -> Self {
        Self::InsufficientData(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is an authentication failure
    pub fn is_auth(&self) -> bool {
        matches!(self, DataplaneError::Auth { .. })
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            DataplaneError::Auth { .. } | DataplaneError::Config(_) | DataplaneError::NotConnected
        )
    }

    /// Get the error category for logs and stats
    pub fn category(&self) -> &'static str {
        match self {
            DataplaneError::Transport { .. } => "transport",
            DataplaneError::Protocol { .. } => "protocol",
            DataplaneError::Parse(_) => "parse",
            DataplaneError::InsufficientData(_) => "insufficient_data",
            DataplaneError::Auth { .. } => "auth",
            DataplaneError::NotConnected => "not_connected",
            DataplaneError::Config(_) => "config",
            DataplaneError::WebSocket(_) => "websocket",
            DataplaneError::Io(_) => "io",
            DataplaneError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_is_not_retryable() {
        let err = DataplaneError::Auth { status: 401 };
        assert!(err.is_auth());
        assert!(!err.is_retryable());
        assert_eq!(err.category(), "auth");
    }

    #[test]
    fn test_transport_display_includes_status() {
        let err = DataplaneError::transport(Some(502), "Bad Gateway");
        assert_eq!(err.to_string(), "Transport error (HTTP 502): Bad Gateway");
        assert!(err.is_retryable());

        let err = DataplaneError::transport(None, "connection refused");
        assert_eq!(err.to_string(), "Transport error: connection refused");
    }

    #[test]
    fn test_json_error_maps_to_parse() {
        let err: DataplaneError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert_eq!(err.category(), "parse");
    }
}
