//! JSON-RPC client
//!
//! Builds request envelopes, ships them through a pluggable transport and
//! maps transport, protocol and decode failures onto the error taxonomy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{config::RpcConfig, DataplaneError, Result};

/// JSON-RPC request envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: u32,
}

impl JsonRpcRequest {
    /// Create a request with a random id in `0..1000`
    pub fn new(method: &str, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: rand::thread_rng().gen_range(0..1000),
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcErrorObject {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
}

/// JSON-RPC response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<JsonRpcErrorObject>,
}

/// Moves a serialized request to the node and returns the raw response body
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Transport name for logs
    fn name(&self) -> &str;

    /// POST a request; fails with `Transport`/`Auth` when the exchange does not succeed
    async fn send(&self, request: &JsonRpcRequest) -> Result<String>;
}

/// HTTP transport backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    /// Create a new HTTP transport
    pub fn new(config: &RpcConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| DataplaneError::transport(None, format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.http_url.clone(),
        })
    }
}

/// Map a non-success HTTP status onto the error taxonomy
pub fn classify_status(status: StatusCode) -> Option<DataplaneError> {
    if status.is_success() {
        return None;
    }

    match status.as_u16() {
        code @ (401 | 403) => Some(DataplaneError::Auth { status: code }),
        code => Some(DataplaneError::transport(
            Some(code),
            format!(
                "RPC call failed: {} {}",
                code,
                status.canonical_reason().unwrap_or("")
            )
            .trim_end()
            .to_string(),
        )),
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    fn name(&self) -> &str {
        &self.url
    }

    async fn send(&self, request: &JsonRpcRequest) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(DataplaneError::from)?;

        if let Some(error) = classify_status(response.status()) {
            return Err(error);
        }

        response.text().await.map_err(DataplaneError::from)
    }
}

/// Client performance metrics
#[derive(Debug, Clone, Default)]
pub struct ClientMetrics {
    /// Total requests made
    pub total_requests: u64,

    /// Successful requests
    pub successful_requests: u64,

    /// Failed requests
    pub failed_requests: u64,

    /// Average response time in milliseconds
    pub avg_response_time_ms: f64,

    /// Requests per method
    pub method_usage: HashMap<String, u64>,
}

impl ClientMetrics {
    /// Record a successful request
    pub fn record_success(&mut self, method: &str, response_time_ms: f64) {
        self.total_requests += 1;
        self.successful_requests += 1;

        let alpha = 0.1;
        self.avg_response_time_ms = alpha * response_time_ms + (1.0 - alpha) * self.avg_response_time_ms;

        *self.method_usage.entry(method.to_string()).or_insert(0) += 1;
    }

    /// Record a failed request
    pub fn record_failure(&mut self, method: &str) {
        self.total_requests += 1;
        self.failed_requests += 1;

        *self.method_usage.entry(method.to_string()).or_insert(0) += 1;
    }

    /// Get success rate
    pub fn success_rate(&self) -> f64 {
        if self.total_requests > 0 {
            self.successful_requests as f64 / self.total_requests as f64
        } else {
            1.0
        }
    }
}

/// JSON-RPC client over any transport
pub struct RpcClient {
    transport: Arc<dyn RpcTransport>,
    metrics: Arc<RwLock<ClientMetrics>>,
}

impl RpcClient {
    /// Create a new RPC client
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            metrics: Arc::new(RwLock::new(ClientMetrics::default())),
        }
    }

    /// Create a client speaking HTTP to the configured endpoint
    pub fn http(config: &RpcConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(HttpTransport::new(config)?)))
    }

    /// Issue a call and return the raw `result` value
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let request = JsonRpcRequest::new(method, params);
        let start_time = Instant::now();

        let outcome = self.exchange(&request).await;
        match &outcome {
            Ok(_) => {
                let response_time_ms = start_time.elapsed().as_secs_f64() * 1000.0;
                self.metrics.write().record_success(method, response_time_ms);
                debug!(method = method, id = request.id, response_time_ms, "RPC call succeeded");
            }
            Err(e) => {
                self.metrics.write().record_failure(method);
                warn!(
                    method = method,
                    transport = self.transport.name(),
                    category = e.category(),
                    error = %e,
                    "RPC call failed"
                );
            }
        }

        outcome
    }

    /// Issue a call and decode the result
    pub async fn request<R: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<R> {
        let result = self.call(method, params).await?;
        serde_json::from_value(result)
            .map_err(|e| DataplaneError::parse(format!("Unexpected result for {}: {}", method, e)))
    }

    async fn exchange(&self, request: &JsonRpcRequest) -> Result<Value> {
        let body = self.transport.send(request).await?;

        let response: JsonRpcResponse = serde_json::from_str(&body)
            .map_err(|e| DataplaneError::parse(format!("Malformed RPC response: {}", e)))?;

        if let Some(error) = response.error {
            return Err(DataplaneError::protocol(error.code, error.message));
        }

        Ok(response.result)
    }

    /// Get client metrics
    pub fn metrics(&self) -> ClientMetrics {
        self.metrics.read().clone()
    }
}

impl Clone for RpcClient {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Replays canned bodies and records the requests it saw
    struct CannedTransport {
        reply: Box<dyn Fn() -> Result<String> + Send + Sync>,
        seen: Mutex<Vec<JsonRpcRequest>>,
    }

    impl CannedTransport {
        fn new(reply: impl Fn() -> Result<String> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                reply: Box::new(reply),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RpcTransport for CannedTransport {
        fn name(&self) -> &str {
            "canned"
        }

        async fn send(&self, request: &JsonRpcRequest) -> Result<String> {
            self.seen.lock().push(request.clone());
            (self.reply)()
        }
    }

    #[tokio::test]
    async fn test_envelope_shape() {
        let transport = CannedTransport::new(|| Ok(r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#.to_string()));
        let client = RpcClient::new(transport.clone());

        let result = client.call("eth_blockNumber", vec![]).await.unwrap();
        assert_eq!(result, json!("0x10"));

        let seen = transport.seen.lock();
        let encoded = serde_json::to_value(&seen[0]).unwrap();
        assert_eq!(encoded["jsonrpc"], json!("2.0"));
        assert_eq!(encoded["method"], json!("eth_blockNumber"));
        assert_eq!(encoded["params"], json!([]));
        assert!(seen[0].id < 1000);
    }

    #[tokio::test]
    async fn test_error_field_is_protocol_error() {
        let transport = CannedTransport::new(|| {
            Ok(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"method not found"}}"#.to_string())
        });
        let client = RpcClient::new(transport);

        let err = client.call("eth_nope", vec![]).await.unwrap_err();
        match err {
            DataplaneError::Protocol { code, message } => {
                assert_eq!(code, Some(-32601));
                assert_eq!(message, "method not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client.metrics().failed_requests, 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let client = RpcClient::new(CannedTransport::new(|| Ok("<html>".to_string())));
        let err = client.call("eth_gasPrice", vec![]).await.unwrap_err();
        assert!(matches!(err, DataplaneError::Parse(_)));
    }

    #[tokio::test]
    async fn test_transport_errors_pass_through() {
        let client = RpcClient::new(CannedTransport::new(|| Err(DataplaneError::Auth { status: 403 })));
        let err = client.call("eth_gasPrice", vec![]).await.unwrap_err();
        assert!(err.is_auth());

        let client = RpcClient::new(CannedTransport::new(|| {
            Err(DataplaneError::transport(Some(500), "Internal Server Error"))
        }));
        let err = client.call("eth_gasPrice", vec![]).await.unwrap_err();
        assert!(matches!(err, DataplaneError::Transport { status: Some(500), .. }));
    }

    #[tokio::test]
    async fn test_typed_request_decode_failure_is_parse_error() {
        let client = RpcClient::new(CannedTransport::new(|| Ok(r#"{"result":42}"#.to_string())));
        let err = client.request::<String>("eth_blockNumber", vec![]).await.unwrap_err();
        assert!(matches!(err, DataplaneError::Parse(_)));

        let metrics = client.metrics();
        assert_eq!(metrics.successful_requests, 1);
        assert_eq!(metrics.method_usage.get("eth_blockNumber"), Some(&1));
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::OK).is_none());
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED),
            Some(DataplaneError::Auth { status: 401 })
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN),
            Some(DataplaneError::Auth { status: 403 })
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            Some(DataplaneError::Transport { status: Some(429), .. })
        ));
    }
}
