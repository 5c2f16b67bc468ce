//! Upstream providers
//!
//! JSON-RPC access to the chain and the realtime socket. Nothing in here
//! derives metrics; see [`crate::metrics`] for that.

pub mod fetcher;
pub mod rpc;
pub mod websocket;

// Re-export commonly used types
pub use fetcher::{ChainFetcher, RpcBlock, RpcTransaction};
pub use rpc::{ClientMetrics, HttpTransport, JsonRpcRequest, RpcClient, RpcTransport};
pub use websocket::{
    ConnectionManager, ConnectionStats, Frame, FrameSink, FrameStream, MessageHistory, SocketConnector,
    TungsteniteConnector,
};
