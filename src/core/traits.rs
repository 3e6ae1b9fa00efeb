use crate::core::errors::ExchangeError;
use crate::core::kernel::{Connection, ProtocolAdapter};
use crate::core::types::{ConnectionState, ExchangeType, InstrumentKind, Subscription};
use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Venue-erased view of a connection, as held by the service
#[async_trait]
pub trait TradingSocketClient: Send + Sync {
    fn exchange(&self) -> ExchangeType;

    fn state(&self) -> ConnectionState;

    fn state_changes(&self) -> watch::Receiver<ConnectionState>;

    fn subscriptions(&self) -> Vec<Subscription>;

    async fn connect(&self, cancel: &CancellationToken) -> Result<(), ExchangeError>;

    async fn subscribe_private(
        &self,
        channel: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ExchangeError>;

    async fn subscribe_ticker(
        &self,
        instrument: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ExchangeError>;

    async fn resubscribe(&self, cancel: &CancellationToken) -> Result<(), ExchangeError>;

    async fn list_instruments(
        &self,
        currency: &str,
        kind: Option<InstrumentKind>,
        cancel: &CancellationToken,
    ) -> Result<(), ExchangeError>;

    async fn close(&self, cancel: &CancellationToken) -> Result<(), ExchangeError>;
}

#[async_trait]
impl<A: ProtocolAdapter> TradingSocketClient for Connection<A> {
    fn exchange(&self) -> ExchangeType {
        self.adapter().exchange()
    }

    fn state(&self) -> ConnectionState {
        Self::state(self)
    }

    fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        Self::state_changes(self)
    }

    fn subscriptions(&self) -> Vec<Subscription> {
        Self::subscriptions(self)
    }

    async fn connect(&self, cancel: &CancellationToken) -> Result<(), ExchangeError> {
        Self::connect(self, cancel).await
    }

    async fn subscribe_private(
        &self,
        channel: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ExchangeError> {
        Self::subscribe_private(self, channel, cancel).await
    }

    async fn subscribe_ticker(
        &self,
        instrument: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ExchangeError> {
        Self::subscribe_ticker(self, instrument, cancel).await
    }

    async fn resubscribe(&self, cancel: &CancellationToken) -> Result<(), ExchangeError> {
        Self::resubscribe(self, cancel).await
    }

    async fn list_instruments(
        &self,
        currency: &str,
        kind: Option<InstrumentKind>,
        cancel: &CancellationToken,
    ) -> Result<(), ExchangeError> {
        Self::list_instruments(self, currency, kind, cancel).await
    }

    async fn close(&self, cancel: &CancellationToken) -> Result<(), ExchangeError> {
        Self::close(self, cancel).await
    }
}
