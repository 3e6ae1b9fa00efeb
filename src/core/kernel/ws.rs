use crate::core::errors::ExchangeError;
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::instrument;

/// Write half of a live WebSocket transport
pub type WsSink = Pin<Box<dyn Sink<Message, Error = ExchangeError> + Send>>;

/// Read half of a live WebSocket transport
pub type WsStream = Pin<Box<dyn Stream<Item = Result<Message, ExchangeError>> + Send>>;

/// WebSocket connection configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Fixed delay between connection attempts in milliseconds
    pub reconnect_delay_ms: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000, // 10 seconds
            reconnect_delay_ms: 5_000,  // 5 seconds
        }
    }
}

impl WsConfig {
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// A freshly opened transport, split into its two halves
///
/// Every connection gets a process-unique `id`, so a replaced transport can
/// always be told apart from its predecessor.
pub struct WsConnection {
    pub id: u64,
    pub sink: WsSink,
    pub stream: WsStream,
}

impl WsConnection {
    pub fn new(sink: WsSink, stream: WsStream) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            sink,
            stream,
        }
    }
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Opens transports; the lifecycle engine asks for a new one on every (re)connect
#[async_trait]
pub trait WsConnector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<WsConnection, ExchangeError>;
}

/// Tungstenite-based connector
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector {
    config: WsConfig,
}

impl TungsteniteConnector {
    pub fn new(config: WsConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl WsConnector for TungsteniteConnector {
    #[instrument(skip(self), fields(url = %url))]
    async fn connect(&self, url: &str) -> Result<WsConnection, ExchangeError> {
        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);

        let (ws_stream, _) = tokio::time::timeout(connect_timeout, connect_async(url))
            .await
            .map_err(|_| {
                ExchangeError::ConnectionTimeout("WebSocket connection timeout".to_string())
            })?
            .map_err(|e| {
                ExchangeError::NetworkError(format!("WebSocket connection failed: {}", e))
            })?;

        let (write, read) = ws_stream.split();
        let sink = write.sink_map_err(|e| {
            ExchangeError::NetworkError(format!("Failed to send WebSocket message: {}", e))
        });
        let stream = read.map(|item| {
            item.map_err(|e| ExchangeError::NetworkError(format!("WebSocket error: {}", e)))
        });

        Ok(WsConnection::new(Box::pin(sink), Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_reconnect_delay() {
        assert_eq!(WsConfig::default().reconnect_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_builders() {
        let config = WsConfig::default()
            .with_reconnect_delay(Duration::from_millis(20))
            .with_connect_timeout(Duration::from_secs(1));
        assert_eq!(config.reconnect_delay_ms, 20);
        assert_eq!(config.connect_timeout_ms, 1_000);
    }

    #[tokio::test]
    async fn test_connect_failure_is_network_error() {
        let connector = TungsteniteConnector::new(
            WsConfig::default().with_connect_timeout(Duration::from_secs(2)),
        );
        let result = connector.connect("ws://127.0.0.1:1").await;
        assert!(matches!(
            result,
            Err(ExchangeError::NetworkError(_) | ExchangeError::ConnectionTimeout(_))
        ));
    }
}
