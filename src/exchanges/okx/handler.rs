use super::conversions::convert_instrument_list;
use crate::core::dispatcher::{DomainEvent, DomainEventHandler, EventDispatcher};
use crate::core::errors::ExchangeError;
use crate::core::types::RequestKind;
use async_trait::async_trait;
use tracing::{debug, trace, warn};

/// Handles `Okx::MessageArrived`; only instrument lists carry data
#[derive(Debug, Default)]
pub struct OkxMessageHandler;

impl OkxMessageHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DomainEventHandler for OkxMessageHandler {
    async fn handle(&self, event: &DomainEvent, dispatcher: &EventDispatcher) -> Result<(), ExchangeError> {
        let DomainEvent::MessageArrived { envelope, .. } = event else {
            return Ok(());
        };
        if envelope.request_kind != Some(RequestKind::InstrumentList) {
            trace!(exchange = "Okx", request = ?envelope.request_kind, "nothing to do");
            return Ok(());
        }

        let (tickers, failures) = convert_instrument_list(&envelope.payload);
        for failure in &failures {
            warn!(exchange = "Okx", error = %failure, "skipping instrument");
        }
        let count = tickers.len();
        for ticker in tickers {
            dispatcher.dispatch(DomainEvent::ContractInfo(ticker)).await?;
        }
        debug!(exchange = "Okx", count, skipped = failures.len(), "instruments dispatched");
        Ok(())
    }
}
