use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::traits::{DuplexChannel, ReadyState};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// WebSocket connection errors
#[derive(Debug, Clone, PartialEq)]
pub enum WsError {
    ConnectionFailed(String),
    Disconnected,
    SendFailed(String),
}

impl std::fmt::Display for WsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WsError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            WsError::Disconnected => write!(f, "Disconnected from server"),
            WsError::SendFailed(msg) => write!(f, "Send failed: {}", msg),
        }
    }
}

impl std::error::Error for WsError {}

/// WebSocket connection state
#[derive(Debug, Clone, PartialEq)]
pub enum WsConnectionState {
    Connected,
    Reconnecting { attempt: u8 },
    Disconnected,
}

impl From<&WsConnectionState> for ReadyState {
    fn from(state: &WsConnectionState) -> Self {
        match state {
            WsConnectionState::Connected => ReadyState::Open,
            WsConnectionState::Reconnecting { .. } => ReadyState::Connecting,
            WsConnectionState::Disconnected => ReadyState::Closed,
        }
    }
}

/// Configuration for WebSocket client
#[derive(Debug, Clone)]
pub struct WsClientConfig {
    pub url: String,
    pub max_retries: u8,
    pub max_backoff_secs: u64,
}

impl Default for WsClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000/live".to_string(),
            max_retries: 5,
            max_backoff_secs: 30,
        }
    }
}

/// Backoff before reconnection attempt `attempt` (1-based): 1s, 2s, 4s, ... capped.
pub fn backoff_secs(attempt: u8, max_backoff_secs: u64) -> u64 {
    let exponent = u32::from(attempt.saturating_sub(1)).min(63);
    std::cmp::min(1u64 << exponent, max_backoff_secs)
}

/// Sending half of a WebSocket connection, usable as a [`DuplexChannel`].
///
/// Cloning is cheap; all clones feed the same connection task.
#[derive(Debug, Clone)]
pub struct WsChannel {
    outgoing_tx: mpsc::Sender<String>,
    state_rx: watch::Receiver<WsConnectionState>,
}

impl WsChannel {
    /// Wait until the connection reports `Connected`.
    pub async fn wait_open(&self) -> Result<(), WsError> {
        let mut state_rx = self.state_rx.clone();
        loop {
            if matches!(*state_rx.borrow(), WsConnectionState::Connected) {
                return Ok(());
            }
            if state_rx.changed().await.is_err() {
                return Err(WsError::Disconnected);
            }
        }
    }
}

impl DuplexChannel for WsChannel {
    fn ready_state(&self) -> ReadyState {
        if self.outgoing_tx.is_closed() {
            return ReadyState::Closed;
        }
        ReadyState::from(&*self.state_rx.borrow())
    }

    fn send_text(&self, frame: String) -> Result<(), WsError> {
        self.outgoing_tx
            .try_send(frame)
            .map_err(|e| WsError::SendFailed(e.to_string()))
    }
}

/// WebSocket client for the agent backend's duplex endpoint
pub struct WsClient {
    /// Channel feeding outbound frames to the connection task
    outgoing_tx: mpsc::Sender<String>,
    /// Receiver for inbound frame payloads
    incoming_rx: mpsc::Receiver<Bytes>,
    /// Watch receiver for connection state changes
    state_rx: watch::Receiver<WsConnectionState>,
    /// Flag to signal shutdown
    shutdown: Arc<AtomicBool>,
}

impl WsClient {
    /// Connect to the WebSocket server
    ///
    /// Completes once the opening handshake has succeeded; returns
    /// `WsError::ConnectionFailed` if it does not.
    pub async fn connect(config: WsClientConfig) -> Result<Self, WsError> {
        let (ws_stream, _) = connect_async(config.url.as_str())
            .await
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

        info!("Connected to WebSocket server at {}", config.url);

        let (ws_sink, ws_source) = ws_stream.split();

        let (incoming_tx, incoming_rx) = mpsc::channel::<Bytes>(256);
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<String>(256);
        let (state_tx, state_rx) = watch::channel(WsConnectionState::Connected);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            run_connection_loop(
                config,
                ws_sink,
                ws_source,
                incoming_tx,
                outgoing_rx,
                state_tx,
                shutdown_clone,
            )
            .await;
        });

        Ok(Self {
            outgoing_tx,
            incoming_rx,
            state_rx,
            shutdown,
        })
    }

    /// Check if currently connected
    pub fn is_connected(&self) -> bool {
        matches!(*self.state_rx.borrow(), WsConnectionState::Connected)
    }

    /// Get the current connection state
    pub fn connection_state(&self) -> WsConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Subscribe to connection state changes
    pub fn state_receiver(&self) -> watch::Receiver<WsConnectionState> {
        self.state_rx.clone()
    }

    /// Sending half for the connection manager
    pub fn channel(&self) -> WsChannel {
        WsChannel {
            outgoing_tx: self.outgoing_tx.clone(),
            state_rx: self.state_rx.clone(),
        }
    }

    /// Get a reference to the incoming frame receiver for use with select!
    pub fn incoming_receiver(&mut self) -> &mut mpsc::Receiver<Bytes> {
        &mut self.incoming_rx
    }

    /// Gracefully shutdown the WebSocket connection
    pub fn shutdown(&self) {
        info!("Shutting down WebSocket client");
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Run the main connection loop with reconnection logic
async fn run_connection_loop(
    config: WsClientConfig,
    mut ws_sink: WsSink,
    mut ws_source: WsSource,
    incoming_tx: mpsc::Sender<Bytes>,
    mut outgoing_rx: mpsc::Receiver<String>,
    state_tx: watch::Sender<WsConnectionState>,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            debug!("Shutdown signal received, closing connection");
            let _ = ws_sink.close().await;
            break;
        }

        let lost = tokio::select! {
            msg = ws_source.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if incoming_tx.send(Bytes::from(text)).await.is_err() {
                            warn!("Incoming channel closed, shutting down");
                            break;
                        }
                        false
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if incoming_tx.send(Bytes::from(data)).await.is_err() {
                            warn!("Incoming channel closed, shutting down");
                            break;
                        }
                        false
                    }
                    Some(Ok(Message::Ping(data))) => {
                        debug!("Received ping, sending pong");
                        let _ = ws_sink.send(Message::Pong(data)).await;
                        false
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Received close frame from server");
                        true
                    }
                    Some(Ok(_)) => false,
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        true
                    }
                    None => {
                        info!("WebSocket stream ended");
                        true
                    }
                }
            }
            frame = outgoing_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = ws_sink.send(Message::Text(frame)).await {
                            error!("Failed to send frame: {}", e);
                        }
                        false
                    }
                    None => {
                        debug!("Outgoing channel closed, shutting down");
                        break;
                    }
                }
            }
        };

        if lost {
            let _ = state_tx.send(WsConnectionState::Disconnected);
            match attempt_reconnect(&config, &state_tx, &shutdown).await {
                Some((new_sink, new_source)) => {
                    ws_sink = new_sink;
                    ws_source = new_source;
                    let _ = state_tx.send(WsConnectionState::Connected);
                }
                None => break,
            }
        }
    }

    info!("Connection loop ended");
    let _ = state_tx.send(WsConnectionState::Disconnected);
}

/// Attempt to reconnect with exponential backoff
async fn attempt_reconnect(
    config: &WsClientConfig,
    state_tx: &watch::Sender<WsConnectionState>,
    shutdown: &Arc<AtomicBool>,
) -> Option<(WsSink, WsSource)> {
    for attempt in 1..=config.max_retries {
        if shutdown.load(Ordering::SeqCst) {
            debug!("Shutdown requested during reconnection");
            return None;
        }

        let _ = state_tx.send(WsConnectionState::Reconnecting { attempt });

        let wait = backoff_secs(attempt, config.max_backoff_secs);
        info!(
            "Reconnection attempt {} of {}, waiting {}s",
            attempt, config.max_retries, wait
        );

        tokio::time::sleep(Duration::from_secs(wait)).await;

        if shutdown.load(Ordering::SeqCst) {
            debug!("Shutdown requested during backoff");
            return None;
        }

        match connect_async(config.url.as_str()).await {
            Ok((ws_stream, _)) => {
                info!("Reconnected successfully on attempt {}", attempt);
                return Some(ws_stream.split());
            }
            Err(e) => {
                warn!("Reconnection attempt {} failed: {}", attempt, e);
            }
        }
    }

    error!(
        "Failed to reconnect after {} attempts, giving up",
        config.max_retries
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_error_display() {
        let err = WsError::ConnectionFailed("timeout".to_string());
        assert_eq!(err.to_string(), "Connection failed: timeout");

        let err = WsError::Disconnected;
        assert_eq!(err.to_string(), "Disconnected from server");

        let err = WsError::SendFailed("channel closed".to_string());
        assert_eq!(err.to_string(), "Send failed: channel closed");
    }

    #[test]
    fn test_connection_state_maps_to_ready_state() {
        assert_eq!(
            ReadyState::from(&WsConnectionState::Connected),
            ReadyState::Open
        );
        assert_eq!(
            ReadyState::from(&WsConnectionState::Reconnecting { attempt: 2 }),
            ReadyState::Connecting
        );
        assert_eq!(
            ReadyState::from(&WsConnectionState::Disconnected),
            ReadyState::Closed
        );
    }

    #[test]
    fn test_ws_client_config_default() {
        let config = WsClientConfig::default();
        assert_eq!(config.url, "ws://127.0.0.1:8000/live");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.max_backoff_secs, 30);
    }

    #[test]
    fn test_backoff_calculation() {
        assert_eq!(backoff_secs(1, 30), 1);
        assert_eq!(backoff_secs(2, 30), 2);
        assert_eq!(backoff_secs(3, 30), 4);
        assert_eq!(backoff_secs(5, 30), 16);
        // 2^5 = 32s, capped at 30s
        assert_eq!(backoff_secs(6, 30), 30);
        assert_eq!(backoff_secs(200, 30), 30);
    }

    #[tokio::test]
    async fn test_channel_state_follows_watch() {
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel(4);
        let (state_tx, state_rx) = watch::channel(WsConnectionState::Connected);
        let channel = WsChannel {
            outgoing_tx,
            state_rx,
        };

        assert_eq!(channel.ready_state(), ReadyState::Open);
        channel.send_text("frame".to_string()).unwrap();
        assert_eq!(outgoing_rx.recv().await.as_deref(), Some("frame"));

        state_tx
            .send(WsConnectionState::Reconnecting { attempt: 1 })
            .unwrap();
        assert_eq!(channel.ready_state(), ReadyState::Connecting);

        drop(outgoing_rx);
        assert_eq!(channel.ready_state(), ReadyState::Closed);
    }

    #[tokio::test]
    async fn test_wait_open_resolves_on_connect() {
        let (outgoing_tx, _outgoing_rx) = mpsc::channel(1);
        let (state_tx, state_rx) = watch::channel(WsConnectionState::Reconnecting { attempt: 1 });
        let channel = WsChannel {
            outgoing_tx,
            state_rx,
        };

        let waiter = tokio::spawn(async move { channel.wait_open().await });
        state_tx.send(WsConnectionState::Connected).unwrap();
        assert_eq!(waiter.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_ws_client_connect_failure() {
        let config = WsClientConfig {
            url: "ws://127.0.0.1:59999/live".to_string(),
            max_retries: 1,
            max_backoff_secs: 1,
        };

        match WsClient::connect(config).await {
            Err(WsError::ConnectionFailed(msg)) => assert!(!msg.is_empty()),
            Err(other) => panic!("Expected ConnectionFailed, got {:?}", other),
            Ok(_) => panic!("Expected connection failure"),
        }
    }
}
