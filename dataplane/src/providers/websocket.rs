//! Realtime connection manager
//!
//! Owns a persistent socket subscription with automatic reconnection and a
//! bounded message history. Runs independently of the polling path.
//!
//! State machine: `disconnected -> connecting -> connected -> disconnected`.
//! A close with code 1000 (manual) never schedules a reconnect; any other
//! close schedules one after `min(base * 2^attempts, max)` until the attempt
//! cap is reached, after which the manager stays idle until `connect` is
//! called again.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::RealtimeConfig,
    utils::{now_millis, Backoff},
    ConnectionState, DataplaneError, RealtimeMessage, Result,
};

/// Close code for a clean, intentional shutdown
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when the socket dropped without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Close code reported for a close frame without a status
const CLOSE_NO_STATUS: u16 = 1005;

/// Frame exchanged with the socket
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Close { code: u16, reason: String },
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = DataplaneError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame>> + Send>>;

/// Opens socket sessions
#[async_trait]
pub trait SocketConnector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream)>;
}

/// Production connector backed by `tokio-tungstenite`
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector;

fn frame_to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Close { code, reason } => Message::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        })),
    }
}

fn message_to_frame(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(Frame::Text(text)),
        Message::Binary(bytes) => String::from_utf8(bytes).ok().map(Frame::Text),
        Message::Close(Some(close)) => Some(Frame::Close {
            code: u16::from(close.code),
            reason: close.reason.into_owned(),
        }),
        Message::Close(None) => Some(Frame::Close {
            code: CLOSE_NO_STATUS,
            reason: String::new(),
        }),
        _ => None,
    }
}

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream)> {
        let (ws_stream, _) = connect_async(url).await?;
        let (ws_sender, ws_receiver) = ws_stream.split();

        let sink = ws_sender
            .with(|frame: Frame| futures::future::ready(Ok::<_, tungstenite::Error>(frame_to_message(frame))))
            .sink_map_err(DataplaneError::from);
        let stream = ws_receiver.filter_map(|message| {
            futures::future::ready(match message {
                Ok(message) => message_to_frame(message).map(Ok),
                Err(e) => Some(Err(DataplaneError::from(e))),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

/// Bounded FIFO of received messages; the oldest entry is evicted first
#[derive(Debug, Clone)]
pub struct MessageHistory {
    entries: VecDeque<RealtimeMessage>,
    capacity: usize,
}

impl MessageHistory {
    /// Capacity is at least one entry
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, message: RealtimeMessage) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(message);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&RealtimeMessage> {
        self.entries.back()
    }

    /// Oldest first
    pub fn to_vec(&self) -> Vec<RealtimeMessage> {
        self.entries.iter().cloned().collect()
    }
}

/// Connection statistics
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    /// Total messages received
    pub messages_received: u64,

    /// Reconnects scheduled since the last successful open
    pub reconnect_attempts: u32,

    /// Sessions opened
    pub sessions_opened: u64,

    /// Last message timestamp
    pub last_message: Option<chrono::DateTime<chrono::Utc>>,
}

/// State shared between the manager and its driver task
struct Shared {
    state_tx: watch::Sender<ConnectionState>,
    history: RwLock<MessageHistory>,
    stats: RwLock<ConnectionStats>,
    messages_tx: broadcast::Sender<RealtimeMessage>,
    /// Outbound queue of the open session, if any
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!(from = %current, to = %state, "Realtime connection state changed");
            *current = state;
            true
        });
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn record_frame(&self, text: &str) {
        let frame: Value = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Failed to parse realtime message");
                return;
            }
        };

        let message = RealtimeMessage::from_frame(frame, now_millis());
        {
            let mut stats = self.stats.write();
            stats.messages_received += 1;
            stats.last_message = Some(chrono::Utc::now());
        }
        self.history.write().push(message.clone());

        // No subscribers is fine
        let _ = self.messages_tx.send(message);
    }
}

struct Driver {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Resilient realtime connection with bounded reconnection
pub struct ConnectionManager {
    config: RealtimeConfig,
    connector: Arc<dyn SocketConnector>,
    shared: Arc<Shared>,
    /// Serializes `connect`/`disconnect` so only one driver ever runs
    lifecycle: tokio::sync::Mutex<()>,
    driver: Mutex<Option<Driver>>,
}

impl ConnectionManager {
    /// Create a manager using the `tokio-tungstenite` connector
    pub fn new(config: RealtimeConfig) -> Self {
        Self::with_connector(config, Arc::new(TungsteniteConnector))
    }

    /// Create a manager with a custom connector
    pub fn with_connector(config: RealtimeConfig, connector: Arc<dyn SocketConnector>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (messages_tx, _) = broadcast::channel(config.history_capacity.max(1));

        Self {
            shared: Arc::new(Shared {
                state_tx,
                history: RwLock::new(MessageHistory::new(config.history_capacity)),
                stats: RwLock::new(ConnectionStats::default()),
                messages_tx,
                outbound: Mutex::new(None),
            }),
            config,
            connector,
            lifecycle: tokio::sync::Mutex::new(()),
            driver: Mutex::new(None),
        }
    }

    /// Start a fresh session, replacing any running one.
    ///
    /// Also the way out of the idle state reached after the reconnect cap.
    pub async fn connect(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_driver().await;
        self.shared.stats.write().reconnect_attempts = 0;

        let token = CancellationToken::new();
        let session = Session {
            url: self.config.ws_url.clone(),
            max_attempts: self.config.max_reconnect_attempts,
            backoff: self.config.backoff(),
            subscribe_new_heads: self.config.subscribe_new_heads,
            connector: Arc::clone(&self.connector),
            shared: Arc::clone(&self.shared),
            token: token.clone(),
        };

        info!(url = %self.config.ws_url, "Starting realtime connection");
        let handle = tokio::spawn(session.run());
        *self.driver.lock() = Some(Driver { token, handle });
    }

    /// Close with code 1000 and stop any pending reconnect
    pub async fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        if self.stop_driver().await {
            info!("Realtime connection closed manually");
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }

    async fn stop_driver(&self) -> bool {
        let driver = self.driver.lock().take();
        match driver {
            Some(driver) => {
                driver.token.cancel();
                if let Err(e) = driver.handle.await {
                    warn!(error = %e, "Realtime driver task ended abnormally");
                }
                true
            }
            None => false,
        }
    }

    /// Queue a message for the open socket.
    ///
    /// Only attempted while connected. A message still queued when its
    /// session ends is dropped, never carried over to the next session.
    pub fn send(&self, message: &Value) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(DataplaneError::NotConnected);
        }

        match self.shared.outbound.lock().as_ref() {
            Some(outbound) => outbound
                .send(message.to_string())
                .map_err(|_| DataplaneError::NotConnected),
            None => Err(DataplaneError::NotConnected),
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Watch connection state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Receive every message as it arrives
    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeMessage> {
        self.shared.messages_tx.subscribe()
    }

    /// Most recent message
    pub fn last_message(&self) -> Option<RealtimeMessage> {
        self.shared.history.read().latest().cloned()
    }

    /// Retained messages, oldest first
    pub fn message_history(&self) -> Vec<RealtimeMessage> {
        self.shared.history.read().to_vec()
    }

    /// Get connection statistics
    pub fn stats(&self) -> ConnectionStats {
        self.shared.stats.read().clone()
    }

    /// Whether a session or pending reconnect is still alive
    pub fn is_active(&self) -> bool {
        self.driver
            .lock()
            .as_ref()
            .map_or(false, |driver| !driver.handle.is_finished())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().take() {
            driver.token.cancel();
        }
    }
}

/// Why a session ended
enum SessionEnd {
    Closed(u16),
    Cancelled,
}

/// Driver task: one socket at a time, reconnecting per policy
struct Session {
    url: String,
    max_attempts: u32,
    backoff: Backoff,
    subscribe_new_heads: bool,
    connector: Arc<dyn SocketConnector>,
    shared: Arc<Shared>,
    token: CancellationToken,
}

impl Session {
    async fn run(self) {
        let mut attempts: u32 = 0;

        loop {
            self.shared.set_state(ConnectionState::Connecting);

            let code = match self.open_and_serve(&mut attempts).await {
                SessionEnd::Cancelled => break,
                SessionEnd::Closed(code) => code,
            };

            self.shared.set_state(ConnectionState::Disconnected);
            info!(code, "Realtime connection closed");

            if code == CLOSE_NORMAL {
                break;
            }

            if attempts >= self.max_attempts {
                warn!(attempts, "Realtime reconnect limit reached, staying idle");
                break;
            }

            let delay = self.backoff.delay(attempts);
            attempts += 1;
            self.shared.stats.write().reconnect_attempts = attempts;
            warn!(
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "Scheduling realtime reconnect"
            );

            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.shared.set_state(ConnectionState::Disconnected);
    }

    async fn open_and_serve(&self, attempts: &mut u32) -> SessionEnd {
        let opened = tokio::select! {
            _ = self.token.cancelled() => return SessionEnd::Cancelled,
            opened = self.connector.connect(&self.url) => opened,
        };

        let (sink, stream) = match opened {
            Ok(parts) => parts,
            Err(e) => {
                // Error path: the close that follows drives reconnection
                error!(error = %e, "Realtime connection failed");
                self.shared.set_state(ConnectionState::Disconnected);
                return SessionEnd::Closed(CLOSE_ABNORMAL);
            }
        };

        let (outbound_tx, mut outbound) = mpsc::unbounded_channel();
        *self.shared.outbound.lock() = Some(outbound_tx);

        info!(url = %self.url, "Realtime connection established");
        self.shared.set_state(ConnectionState::Connected);
        *attempts = 0;
        {
            let mut stats = self.shared.stats.write();
            stats.reconnect_attempts = 0;
            stats.sessions_opened += 1;
        }

        let end = self.serve(sink, stream, &mut outbound).await;

        self.shared.outbound.lock().take();
        outbound.close();
        let mut dropped = 0usize;
        while outbound.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(dropped, "Discarded messages queued for a closed session");
        }

        end
    }

    async fn serve(
        &self,
        mut sink: FrameSink,
        mut stream: FrameStream,
        outbound: &mut mpsc::UnboundedReceiver<String>,
    ) -> SessionEnd {
        if self.subscribe_new_heads {
            let request = json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "eth_subscribe",
                "params": ["newHeads"]
            });
            if let Err(e) = sink.send(Frame::Text(request.to_string())).await {
                warn!(error = %e, "Failed to send newHeads subscription");
            }
        }

        loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    let close = Frame::Close {
                        code: CLOSE_NORMAL,
                        reason: "Manual disconnect".to_string(),
                    };
                    if let Err(e) = sink.send(close).await {
                        debug!(error = %e, "Close frame not delivered");
                    }
                    return SessionEnd::Cancelled;
                }
                Some(text) = outbound.recv() => {
                    if let Err(e) = sink.send(Frame::Text(text)).await {
                        error!(error = %e, "Failed to send realtime message");
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(Frame::Text(text))) => self.shared.record_frame(&text),
                    Some(Ok(Frame::Close { code, reason })) => {
                        debug!(code, reason = %reason, "Close frame received");
                        return SessionEnd::Closed(code);
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Realtime connection error");
                        self.shared.set_state(ConnectionState::Disconnected);
                    }
                    None => return SessionEnd::Closed(CLOSE_ABNORMAL),
                },
            }
        }
    }
}
