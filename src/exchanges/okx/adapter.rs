use super::types::{OkxResponse, OkxWsRequest};
use crate::core::errors::ExchangeError;
use crate::core::kernel::{OutboundFrame, ProtocolAdapter, RestClient};
use crate::core::types::{Envelope, ExchangeType, InstrumentKind, RequestKind};
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// OKX op/args dialect
///
/// Frames carry no correlation id and the public endpoint needs no login.
/// Inbound frames are not decoded.
#[derive(Debug)]
pub struct OkxAdapter<R: RestClient> {
    rest: R,
}

impl<R: RestClient> OkxAdapter<R> {
    pub fn new(rest: R) -> Self {
        Self { rest }
    }

    fn subscribe(channel: String) -> Result<OutboundFrame, ExchangeError> {
        let text = serde_json::to_string(&OkxWsRequest::subscribe(channel))?;
        Ok(OutboundFrame::uncorrelated(text))
    }
}

#[async_trait]
impl<R: RestClient + 'static> ProtocolAdapter for OkxAdapter<R> {
    fn exchange(&self) -> ExchangeType {
        ExchangeType::Okx
    }

    fn name(&self) -> &'static str {
        "Okx"
    }

    fn requires_auth(&self) -> bool {
        false
    }

    fn build_auth_request(&self) -> Result<OutboundFrame, ExchangeError> {
        Err(ExchangeError::Unsupported("Okx authentication".to_string()))
    }

    fn build_subscribe_private(&self, channel: &str) -> Result<OutboundFrame, ExchangeError> {
        Self::subscribe(channel.to_string())
    }

    fn build_subscribe_ticker(&self, instrument: &str) -> Result<OutboundFrame, ExchangeError> {
        Self::subscribe(self.ticker_channel(instrument))
    }

    fn ticker_channel(&self, instrument: &str) -> String {
        format!("ticker:{}", instrument)
    }

    fn parse_response(&self, _raw: &str) -> Result<Option<Envelope>, ExchangeError> {
        Err(ExchangeError::Unsupported("Okx response parsing".to_string()))
    }

    #[instrument(skip(self, cancel), fields(exchange = "Okx"))]
    async fn list_instruments(
        &self,
        currency: &str,
        kind: Option<InstrumentKind>,
        cancel: &CancellationToken,
    ) -> Result<Envelope, ExchangeError> {
        let mut params = vec![("uly", currency)];
        if let Some(kind) = kind {
            params.push(("instType", kind.as_upper()));
        }

        let body = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ExchangeError::Cancelled),
            body = self.rest.get("/market/instruments", &params) => body?,
        };
        let raw = body.to_string();
        let response: OkxResponse<Value> = serde_json::from_value(body)?;
        if response.code != "0" {
            return Err(ExchangeError::ApiError {
                code: response.code.parse().unwrap_or(-1),
                message: response.msg,
            });
        }

        Ok(Envelope::new(raw, response.data, Some(RequestKind::InstrumentList)))
    }
}
