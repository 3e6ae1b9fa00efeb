use crate::core::bus::EventBus;
use crate::core::config::ConfigError;
use crate::core::errors::ExchangeError;
use crate::core::traits::TradingSocketClient;
use crate::core::types::{ExchangeType, Ticker};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Entry point for applications: one client per configured venue plus the
/// shared ticker bus
pub struct TradingSocketService {
    clients: HashMap<ExchangeType, Arc<dyn TradingSocketClient>>,
    bus: Arc<EventBus<Ticker>>,
}

impl TradingSocketService {
    pub fn new(
        clients: HashMap<ExchangeType, Arc<dyn TradingSocketClient>>,
        bus: Arc<EventBus<Ticker>>,
    ) -> Self {
        Self { clients, bus }
    }

    fn require(&self, exchange: ExchangeType) -> Result<&Arc<dyn TradingSocketClient>, ExchangeError> {
        self.clients.get(&exchange).ok_or_else(|| {
            ConfigError::UnsupportedExchange(format!("{} is not configured", exchange)).into()
        })
    }

    /// Connect (and authenticate) the venue's client
    pub async fn start(
        &self,
        exchange: ExchangeType,
        cancel: &CancellationToken,
    ) -> Result<(), ExchangeError> {
        info!(exchange = %exchange, "starting client");
        self.require(exchange)?.connect(cancel).await
    }

    pub async fn stop(
        &self,
        exchange: ExchangeType,
        cancel: &CancellationToken,
    ) -> Result<(), ExchangeError> {
        info!(exchange = %exchange, "stopping client");
        self.require(exchange)?.close(cancel).await
    }

    pub fn client(&self, exchange: ExchangeType) -> Option<Arc<dyn TradingSocketClient>> {
        self.clients.get(&exchange).cloned()
    }

    pub fn exchanges(&self) -> Vec<ExchangeType> {
        self.clients.keys().copied().collect()
    }

    /// Normalized instrument stream shared by all venues
    pub fn events(&self) -> &Arc<EventBus<Ticker>> {
        &self.bus
    }
}

impl std::fmt::Debug for TradingSocketService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingSocketService")
            .field("exchanges", &self.exchanges())
            .field("bus", &self.bus)
            .finish()
    }
}
