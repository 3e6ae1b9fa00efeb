use super::conversions::convert_instrument_list;
use crate::core::dispatcher::{DomainEvent, DomainEventHandler, EventDispatcher};
use crate::core::errors::ExchangeError;
use crate::core::types::{Envelope, RequestKind};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, trace, warn};

/// Handles `Deribit::MessageArrived`
///
/// Instrument lists are normalized and raised as one `ContractInfo` event per
/// instrument.
#[derive(Debug, Default)]
pub struct DeribitMessageHandler;

impl DeribitMessageHandler {
    pub fn new() -> Self {
        Self
    }

    async fn raise_instruments(
        &self,
        envelope: &Envelope,
        dispatcher: &EventDispatcher,
    ) -> Result<(), ExchangeError> {
        let (tickers, failures) = convert_instrument_list(&envelope.payload);
        for failure in &failures {
            warn!(exchange = "Deribit", error = %failure, "skipping instrument");
        }

        let count = tickers.len();
        for ticker in tickers {
            dispatcher.dispatch(DomainEvent::ContractInfo(ticker)).await?;
        }
        debug!(exchange = "Deribit", count, skipped = failures.len(), "instruments dispatched");
        Ok(())
    }
}

#[async_trait]
impl DomainEventHandler for DeribitMessageHandler {
    async fn handle(&self, event: &DomainEvent, dispatcher: &EventDispatcher) -> Result<(), ExchangeError> {
        let DomainEvent::MessageArrived { envelope, .. } = event else {
            return Ok(());
        };

        match envelope.request_kind {
            Some(RequestKind::Authenticate) => {
                let scope = envelope.payload.get("scope").and_then(Value::as_str);
                info!(exchange = "Deribit", scope, "Authentication successful");
            }
            Some(RequestKind::Subscribe) => {
                debug!(exchange = "Deribit", channels = %envelope.payload, "subscription confirmed");
            }
            Some(RequestKind::InstrumentList) => self.raise_instruments(envelope, dispatcher).await?,
            None => trace!(exchange = "Deribit", correlation_id = ?envelope.correlation_id, "untracked response"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatcher::{handler_fn, EventType, HandlerRegistry};
    use crate::core::types::ExchangeType;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn contract_recorder(codes: Arc<Mutex<Vec<String>>>) -> EventDispatcher {
        let registry = HandlerRegistry::new().register(
            EventType::ContractInfo,
            handler_fn(move |event| {
                let codes = Arc::clone(&codes);
                async move {
                    if let DomainEvent::ContractInfo(ticker) = event {
                        codes.lock().push(ticker.code);
                    }
                    Ok(())
                }
            }),
        );
        EventDispatcher::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_instrument_list_raises_contract_info() {
        let codes = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = contract_recorder(Arc::clone(&codes));

        let body = json!({
            "result": [
                {"instrument_name": "BTC-PERPETUAL", "kind": "future", "base_currency": "BTC",
                 "quote_currency": "USD", "settlement_currency": "BTC", "tick_size": 0.5,
                 "min_trade_amount": 10, "contract_size": 10, "instrument_type": "reversed",
                 "max_leverage": 50, "expiration_timestamp": 32_503_708_800_000_i64},
                {"instrument_name": "BTC-FS-PERP", "kind": "future_combo"}
            ]
        });
        let event = DomainEvent::MessageArrived {
            exchange: ExchangeType::Deribit,
            envelope: Envelope::new(body.to_string(), body, Some(RequestKind::InstrumentList)),
        };

        DeribitMessageHandler::new().handle(&event, &dispatcher).await.unwrap();
        assert_eq!(*codes.lock(), vec!["BTC-PERPETUAL".to_string()]);
    }

    #[tokio::test]
    async fn test_instrument_list_without_contract_handler_fails() {
        let dispatcher = EventDispatcher::new(Arc::new(HandlerRegistry::new()));
        let body = json!({"result": [
            {"instrument_name": "ETH-PERPETUAL", "kind": "future", "base_currency": "ETH",
             "quote_currency": "USD", "settlement_currency": "ETH", "tick_size": 0.05,
             "min_trade_amount": 1, "contract_size": 1, "instrument_type": "reversed"}
        ]});
        let event = DomainEvent::MessageArrived {
            exchange: ExchangeType::Deribit,
            envelope: Envelope::new(body.to_string(), body, Some(RequestKind::InstrumentList)),
        };

        let result = DeribitMessageHandler::new().handle(&event, &dispatcher).await;
        assert!(matches!(result, Err(ExchangeError::NoHandler(name)) if name == "ContractInfo"));
    }

    #[tokio::test]
    async fn test_auth_response_is_accepted() {
        let dispatcher = EventDispatcher::new(Arc::new(HandlerRegistry::new()));
        let payload = json!({"access_token": "T1", "scope": "session:apiconsole"});
        let event = DomainEvent::MessageArrived {
            exchange: ExchangeType::Deribit,
            envelope: Envelope::new(payload.to_string(), payload, Some(RequestKind::Authenticate))
                .with_correlation_id(42),
        };
        assert!(DeribitMessageHandler::new().handle(&event, &dispatcher).await.is_ok());
    }
}
