use crate::core::errors::ExchangeError;
use crate::core::types::{Envelope, ExchangeType, InstrumentKind};
use async_trait::async_trait;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// An encoded request ready to be written to the socket
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Correlation id registered for this frame, `None` for fire-and-forget dialects
    pub id: Option<u64>,
    pub message: Message,
}

impl OutboundFrame {
    pub fn correlated(id: u64, text: String) -> Self {
        Self {
            id: Some(id),
            message: Message::Text(text),
        }
    }

    pub fn uncorrelated(text: String) -> Self {
        Self {
            id: None,
            message: Message::Text(text),
        }
    }
}

/// Venue wire dialect plugged into the lifecycle engine
///
/// The engine owns the socket and the reconnect policy; everything that differs
/// between venues (frame layout, correlation, authentication, the REST side
/// channel) lives behind this trait. Adding a venue means implementing it.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync + 'static {
    fn exchange(&self) -> ExchangeType;

    /// Name used in log lines
    fn name(&self) -> &'static str;

    /// Whether `connect` must authenticate before the session is ready
    fn requires_auth(&self) -> bool;

    /// Encode the login request
    ///
    /// Venues without a login flow return [`ExchangeError::Unsupported`].
    fn build_auth_request(&self) -> Result<OutboundFrame, ExchangeError>;

    /// Encode a subscription to an account-scoped channel
    fn build_subscribe_private(&self, channel: &str) -> Result<OutboundFrame, ExchangeError>;

    /// Encode a subscription to an instrument's ticker channel
    fn build_subscribe_ticker(&self, instrument: &str) -> Result<OutboundFrame, ExchangeError>;

    /// Channel name `build_subscribe_ticker` subscribes to
    fn ticker_channel(&self, instrument: &str) -> String;

    /// Decode an inbound text frame
    ///
    /// # Returns
    /// - `Ok(Some(envelope))` - a response worth dispatching
    /// - `Ok(None)` - frame deliberately ignored
    /// - `Err(error)` - malformed frame or unsupported operation
    fn parse_response(&self, raw: &str) -> Result<Option<Envelope>, ExchangeError>;

    /// Fetch the instrument list over the venue's REST API
    async fn list_instruments(
        &self,
        currency: &str,
        kind: Option<InstrumentKind>,
        cancel: &CancellationToken,
    ) -> Result<Envelope, ExchangeError>;

    /// Drop per-session state before a new transport is opened
    fn reset_session(&self) {}
}
