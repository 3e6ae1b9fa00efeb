use crate::core::bus::EventBus;
use crate::core::config::{ConfigError, ConnectionConfig};
use crate::core::dispatcher::{handler_fn, DomainEvent, EventDispatcher, EventType, HandlerRegistry};
use crate::core::errors::ExchangeError;
use crate::core::kernel::{
    Connection, CorrelationIdGenerator, ReqwestRest, RequestRegistry, TungsteniteConnector,
    WsConfig, WsConnector,
};
use crate::core::traits::TradingSocketClient;
use crate::core::types::{ExchangeType, Ticker};
use crate::exchanges::deribit::{DeribitAdapter, DeribitMessageHandler};
use crate::exchanges::okx::{OkxAdapter, OkxMessageHandler};
use crate::service::TradingSocketService;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Factory wiring venues, handlers and shared state into a service
pub struct ExchangeFactory;

impl ExchangeFactory {
    /// Build a service over real WebSocket transports with default settings
    ///
    /// Must be called inside a tokio runtime (the ticker bus spawns its consumer).
    pub fn build_service(configs: Vec<ConnectionConfig>) -> Result<TradingSocketService, ExchangeError> {
        let ws_config = WsConfig::default();
        let connector: Arc<dyn WsConnector> = Arc::new(TungsteniteConnector::new(ws_config.clone()));
        Self::build_service_with(configs, connector, ws_config)
    }

    /// Build a service over an arbitrary transport
    ///
    /// All venues share one correlation id generator, one request registry and
    /// one ticker bus. Each venue's message handler is registered before the
    /// dispatcher is frozen.
    pub fn build_service_with(
        configs: Vec<ConnectionConfig>,
        connector: Arc<dyn WsConnector>,
        ws_config: WsConfig,
    ) -> Result<TradingSocketService, ExchangeError> {
        if configs.is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "Application misconfigured, no connection settings".to_string(),
            )
            .into());
        }

        let mut venues: Vec<(ExchangeType, ConnectionConfig)> = Vec::with_capacity(configs.len());
        for config in configs {
            let exchange: ExchangeType = config.exchange.parse()?;
            if venues.iter().any(|(known, _)| *known == exchange) {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "{} configured more than once",
                    exchange
                ))
                .into());
            }
            venues.push((exchange, config));
        }

        let ids = Arc::new(CorrelationIdGenerator::new());
        let requests = Arc::new(RequestRegistry::new());
        let bus: Arc<EventBus<Ticker>> = Arc::new(EventBus::new());

        let exchanges: Vec<ExchangeType> = venues.iter().map(|(exchange, _)| *exchange).collect();
        let handlers = Self::handler_registry(&exchanges, &bus);
        let dispatcher = EventDispatcher::new(Arc::new(handlers));

        let mut clients: HashMap<ExchangeType, Arc<dyn TradingSocketClient>> = HashMap::new();
        for (exchange, config) in venues {
            let rest = ReqwestRest::new(config.rest_url.clone(), config.exchange.to_lowercase())?;
            let client: Arc<dyn TradingSocketClient> = match exchange {
                ExchangeType::Deribit => {
                    let adapter = DeribitAdapter::new(rest, &config, Arc::clone(&ids), Arc::clone(&requests));
                    Arc::new(Connection::new(
                        config.ws_url.clone(),
                        Arc::new(adapter),
                        Arc::clone(&connector),
                        dispatcher.clone(),
                        ws_config.clone(),
                    ))
                }
                ExchangeType::Okx => Arc::new(Connection::new(
                    config.ws_url.clone(),
                    Arc::new(OkxAdapter::new(rest)),
                    Arc::clone(&connector),
                    dispatcher.clone(),
                    ws_config.clone(),
                )),
            };
            info!(exchange = %exchange, ws_url = %config.ws_url, "configured venue");
            clients.insert(exchange, client);
        }

        Ok(TradingSocketService::new(clients, bus))
    }

    /// Handler table for the configured venues
    ///
    /// Venue handlers turn instrument lists into `ContractInfo` events, which
    /// are published on the ticker bus.
    pub fn handler_registry(exchanges: &[ExchangeType], bus: &Arc<EventBus<Ticker>>) -> HandlerRegistry {
        let contract_bus = Arc::clone(bus);
        let mut handlers = HandlerRegistry::new().register(
            EventType::ContractInfo,
            handler_fn(move |event| {
                let bus = Arc::clone(&contract_bus);
                async move {
                    match event {
                        DomainEvent::ContractInfo(ticker) => bus.publish(ticker),
                        DomainEvent::MessageArrived { .. } => Ok(()),
                    }
                }
            }),
        );
        for exchange in exchanges {
            handlers = match exchange {
                ExchangeType::Deribit => handlers.register(
                    EventType::MessageArrived(ExchangeType::Deribit),
                    Arc::new(DeribitMessageHandler::new()),
                ),
                ExchangeType::Okx => handlers.register(
                    EventType::MessageArrived(ExchangeType::Okx),
                    Arc::new(OkxMessageHandler::new()),
                ),
            };
        }
        handlers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ConnectionState, Envelope, RequestKind};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    fn bus_recorder(bus: &EventBus<Ticker>) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(move |ticker: Ticker| {
            let sink = Arc::clone(&sink);
            async move { sink.lock().push(ticker.code) }
        });
        seen
    }

    async fn wait_for_codes(seen: &Arc<Mutex<Vec<String>>>, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while seen.lock().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("tickers were not delivered");
    }

    #[tokio::test]
    async fn test_contract_info_reaches_bus_subscribers() {
        let bus = Arc::new(EventBus::new());
        let seen = bus_recorder(&bus);
        let dispatcher = EventDispatcher::new(Arc::new(ExchangeFactory::handler_registry(&[], &bus)));

        let ticker: Ticker = serde_json::from_value(json!({
            "exchange": "Okx", "code": "BTC-USDT", "underlying": "BTC-USDT",
            "base_currency": "BTC", "quote_currency": "USDT", "settle_currency": "",
            "multiplier": "1", "max_leverage": 1, "option_type": null, "exp_date": null,
            "tick_size": "0.1", "lot_size": "0.00001", "min_size": "0.00001",
            "contract_type": "Linear", "strike": "0", "instrument_type": "Spot"
        }))
        .unwrap();
        dispatcher.dispatch(DomainEvent::ContractInfo(ticker)).await.unwrap();

        wait_for_codes(&seen, 1).await;
        assert_eq!(*seen.lock(), vec!["BTC-USDT".to_string()]);
    }

    #[tokio::test]
    async fn test_instrument_list_flows_to_bus() {
        let bus = Arc::new(EventBus::new());
        let seen = bus_recorder(&bus);
        let dispatcher = EventDispatcher::new(Arc::new(ExchangeFactory::handler_registry(
            &[ExchangeType::Okx],
            &bus,
        )));

        let data = json!([
            {"instType": "SWAP", "instId": "BTC-USDT-SWAP", "ctType": "linear"},
            {"instType": "SPOT", "instId": "ETH-USDT"}
        ]);
        dispatcher
            .dispatch(DomainEvent::MessageArrived {
                exchange: ExchangeType::Okx,
                envelope: Envelope::new(data.to_string(), data, Some(RequestKind::InstrumentList)),
            })
            .await
            .unwrap();

        wait_for_codes(&seen, 2).await;
        assert_eq!(*seen.lock(), vec!["BTC-USDT-SWAP".to_string(), "ETH-USDT".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_configuration_is_rejected() {
        let result = ExchangeFactory::build_service(Vec::new());
        assert!(matches!(
            result,
            Err(ExchangeError::ConfigError(ConfigError::InvalidConfiguration(_)))
        ));
    }

    #[tokio::test]
    async fn test_unknown_exchange_is_rejected() {
        let result = ExchangeFactory::build_service(vec![ConnectionConfig::read_only("binance")]);
        assert!(matches!(
            result,
            Err(ExchangeError::ConfigError(ConfigError::UnsupportedExchange(name))) if name == "binance"
        ));
    }

    #[tokio::test]
    async fn test_duplicate_exchange_is_rejected() {
        let result = ExchangeFactory::build_service(vec![
            ConnectionConfig::read_only("okx"),
            ConnectionConfig::read_only("OKX"),
        ]);
        assert!(matches!(
            result,
            Err(ExchangeError::ConfigError(ConfigError::InvalidConfiguration(_)))
        ));
    }

    #[tokio::test]
    async fn test_one_client_per_venue() {
        let service = ExchangeFactory::build_service(vec![
            ConnectionConfig::new("deribit", "id".to_string(), "secret".to_string()),
            ConnectionConfig::read_only("okx"),
        ])
        .unwrap();

        let mut exchanges = service.exchanges();
        exchanges.sort_by_key(|e| e.to_string());
        assert_eq!(exchanges, vec![ExchangeType::Deribit, ExchangeType::Okx]);

        let okx = service.client(ExchangeType::Okx).unwrap();
        assert_eq!(okx.exchange(), ExchangeType::Okx);
        assert_eq!(okx.state(), ConnectionState::Disconnected);
        assert_eq!(service.events().subscriber_count(), 0);
    }
}
