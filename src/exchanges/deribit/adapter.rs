use super::types::{DeribitAuthParams, DeribitAuthResult, DeribitRequest, DeribitSubscribeParams};
use crate::core::config::ConnectionConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{CorrelationIdGenerator, OutboundFrame, ProtocolAdapter, RequestRegistry, RestClient};
use crate::core::types::{Envelope, ExchangeType, InstrumentKind, RequestKind};
use async_trait::async_trait;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// JSON-RPC 2.0 dialect spoken by Deribit
///
/// Every request carries a correlation id from the shared generator and is
/// registered before the frame leaves the adapter. Responses are matched back
/// through the registry; an `Authenticate` response carrying an access token
/// unlocks private subscriptions until the next reconnect.
pub struct DeribitAdapter<R: RestClient> {
    rest: R,
    ids: Arc<CorrelationIdGenerator>,
    registry: Arc<RequestRegistry>,
    client_id: Secret<String>,
    client_secret: Secret<String>,
    access_token: RwLock<Option<Secret<String>>>,
}

impl<R: RestClient> DeribitAdapter<R> {
    pub fn new(
        rest: R,
        config: &ConnectionConfig,
        ids: Arc<CorrelationIdGenerator>,
        registry: Arc<RequestRegistry>,
    ) -> Self {
        Self {
            rest,
            ids,
            registry,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            access_token: RwLock::new(None),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.read().is_some()
    }

    /// Serialize a request and register its id under `kind`
    fn correlated<P: Serialize>(
        &self,
        method: &'static str,
        params: P,
        kind: RequestKind,
    ) -> Result<OutboundFrame, ExchangeError> {
        let id = self.ids.generate();
        let text = serde_json::to_string(&DeribitRequest::new(method, params, id))?;
        self.registry.register(id, kind);
        Ok(OutboundFrame::correlated(id, text))
    }

    fn record_token(&self, result: &Value) {
        match serde_json::from_value::<DeribitAuthResult>(result.clone()) {
            Ok(auth) => {
                *self.access_token.write() = Some(Secret::new(auth.access_token));
                debug!(exchange = "Deribit", expires_in = ?auth.expires_in, "access token recorded");
            }
            Err(e) => warn!(exchange = "Deribit", error = %e, "authentication response without access token"),
        }
    }
}

#[async_trait]
impl<R: RestClient + 'static> ProtocolAdapter for DeribitAdapter<R> {
    fn exchange(&self) -> ExchangeType {
        ExchangeType::Deribit
    }

    fn name(&self) -> &'static str {
        "Deribit"
    }

    fn requires_auth(&self) -> bool {
        true
    }

    fn build_auth_request(&self) -> Result<OutboundFrame, ExchangeError> {
        let params = DeribitAuthParams {
            grant_type: "client_credentials",
            client_id: self.client_id.expose_secret(),
            client_secret: self.client_secret.expose_secret(),
        };
        self.correlated("public/auth", params, RequestKind::Authenticate)
    }

    fn build_subscribe_private(&self, channel: &str) -> Result<OutboundFrame, ExchangeError> {
        if !self.is_authenticated() {
            return Err(ExchangeError::NotAuthenticated(
                "Client is not authenticated.".to_string(),
            ));
        }
        let params = DeribitSubscribeParams {
            channels: vec![channel.to_string()],
        };
        self.correlated("private/subscribe", params, RequestKind::Subscribe)
    }

    fn build_subscribe_ticker(&self, instrument: &str) -> Result<OutboundFrame, ExchangeError> {
        let params = DeribitSubscribeParams {
            channels: vec![self.ticker_channel(instrument)],
        };
        self.correlated("public/subscribe", params, RequestKind::Subscribe)
    }

    fn ticker_channel(&self, instrument: &str) -> String {
        format!("ticker.{}.raw", instrument)
    }

    fn parse_response(&self, raw: &str) -> Result<Option<Envelope>, ExchangeError> {
        let value: Value = serde_json::from_str(raw)?;
        let Some(id) = value.get("id").and_then(Value::as_u64) else {
            // notifications and heartbeats carry no id
            return Ok(None);
        };

        if let Some(error) = value.get("error") {
            let kind = self.registry.take(id);
            warn!(exchange = "Deribit", correlation_id = id, request = ?kind, error = %error, "request rejected");
            return Ok(None);
        }
        let Some(result) = value.get("result") else {
            return Ok(None);
        };

        let kind = self.registry.take(id);
        if kind.is_none() {
            debug!(exchange = "Deribit", correlation_id = id, "response for untracked request");
        }
        if kind == Some(RequestKind::Authenticate) {
            self.record_token(result);
        }

        Ok(Some(
            Envelope::new(raw.to_string(), result.clone(), kind).with_correlation_id(id),
        ))
    }

    #[instrument(skip(self, cancel), fields(exchange = "Deribit"))]
    async fn list_instruments(
        &self,
        currency: &str,
        kind: Option<InstrumentKind>,
        cancel: &CancellationToken,
    ) -> Result<Envelope, ExchangeError> {
        let mut params = vec![("currency", currency), ("expired", "false")];
        if let Some(kind) = kind {
            params.push(("kind", kind.as_lower()));
        }

        let body = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ExchangeError::Cancelled),
            body = self.rest.get("/public/get_instruments", &params) => body?,
        };
        let raw = body.to_string();
        Ok(Envelope::new(raw, body, Some(RequestKind::InstrumentList)))
    }

    fn reset_session(&self) {
        if self.access_token.write().take().is_some() {
            debug!(exchange = "Deribit", "access token dropped for new session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio_tungstenite::tungstenite::Message;

    #[derive(Default)]
    struct RecordingRest {
        calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    #[async_trait]
    impl RestClient for RecordingRest {
        async fn get(
            &self,
            endpoint: &str,
            query_params: &[(&str, &str)],
        ) -> Result<Value, ExchangeError> {
            self.calls.lock().push((
                endpoint.to_string(),
                query_params
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            ));
            Ok(json!({"jsonrpc": "2.0", "result": []}))
        }
    }

    fn adapter() -> DeribitAdapter<RecordingRest> {
        let config = ConnectionConfig::new("deribit", "abc".to_string(), "xyz".to_string());
        DeribitAdapter::new(
            RecordingRest::default(),
            &config,
            Arc::new(CorrelationIdGenerator::new()),
            Arc::new(RequestRegistry::new()),
        )
    }

    fn frame_json(frame: &OutboundFrame) -> Value {
        match &frame.message {
            Message::Text(text) => serde_json::from_str(text).unwrap(),
            other => panic!("Expected text frame, got {:?}", other),
        }
    }

    #[test]
    fn test_auth_frame_layout() {
        let adapter = adapter();
        let frame = adapter.build_auth_request().unwrap();
        let id = frame.id.unwrap();

        assert_eq!(
            frame_json(&frame),
            json!({
                "jsonrpc": "2.0",
                "method": "public/auth",
                "params": {
                    "grant_type": "client_credentials",
                    "client_id": "abc",
                    "client_secret": "xyz"
                },
                "id": id
            })
        );
        assert_eq!(adapter.registry.try_get(id), Some(RequestKind::Authenticate));
    }

    #[test]
    fn test_ticker_subscription() {
        let adapter = adapter();
        let frame = adapter.build_subscribe_ticker("BTC-PERPETUAL").unwrap();
        let body = frame_json(&frame);

        assert_eq!(body["method"], "public/subscribe");
        assert_eq!(body["params"]["channels"], json!(["ticker.BTC-PERPETUAL.raw"]));
        assert_eq!(
            adapter.registry.try_get(frame.id.unwrap()),
            Some(RequestKind::Subscribe)
        );
    }

    #[test]
    fn test_private_subscribe_requires_token() {
        let adapter = adapter();
        let registered_before = adapter.registry.len();
        let result = adapter.build_subscribe_private("user.access_log");

        assert!(matches!(result, Err(ExchangeError::NotAuthenticated(_))));
        assert_eq!(adapter.registry.len(), registered_before);
    }

    #[test]
    fn test_auth_response_unlocks_private_channels() {
        let adapter = adapter();
        adapter.registry.register(42, RequestKind::Authenticate);

        let envelope = adapter
            .parse_response(r#"{"jsonrpc":"2.0","result":{"access_token":"T1","expires_in":900},"id":42}"#)
            .unwrap()
            .unwrap();

        assert_eq!(envelope.request_kind, Some(RequestKind::Authenticate));
        assert_eq!(envelope.correlation_id, Some(42));
        assert_eq!(envelope.payload["access_token"], "T1");
        assert!(adapter.registry.try_get(42).is_none());
        assert!(adapter.is_authenticated());

        let frame = adapter.build_subscribe_private("user.access_log").unwrap();
        let body = frame_json(&frame);
        assert_eq!(body["method"], "private/subscribe");
        assert_eq!(body["params"]["channels"], json!(["user.access_log"]));

        adapter.reset_session();
        assert!(!adapter.is_authenticated());
    }

    #[test]
    fn test_frames_without_result_or_id_are_ignored() {
        let adapter = adapter();
        assert!(adapter
            .parse_response(r#"{"jsonrpc":"2.0","method":"heartbeat","params":{"type":"test_request"}}"#)
            .unwrap()
            .is_none());
        assert!(adapter.parse_response(r#"{"jsonrpc":"2.0","id":7}"#).unwrap().is_none());
    }

    #[test]
    fn test_error_response_evicts_request() {
        let adapter = adapter();
        adapter.registry.register(9, RequestKind::Subscribe);
        let parsed = adapter
            .parse_response(r#"{"jsonrpc":"2.0","error":{"code":13009,"message":"unauthorized"},"id":9}"#)
            .unwrap();
        assert!(parsed.is_none());
        assert!(adapter.registry.is_empty());
    }

    #[test]
    fn test_unknown_id_yields_untagged_envelope() {
        let adapter = adapter();
        let envelope = adapter
            .parse_response(r#"{"result":{"ok":true},"id":77}"#)
            .unwrap()
            .unwrap();
        assert_eq!(envelope.request_kind, None);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let adapter = adapter();
        assert!(matches!(
            adapter.parse_response("{not json"),
            Err(ExchangeError::JsonError(_))
        ));
    }

    #[tokio::test]
    async fn test_list_instruments_query() {
        let adapter = adapter();
        let envelope = adapter
            .list_instruments("BTC", Some(InstrumentKind::Option), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(envelope.request_kind, Some(RequestKind::InstrumentList));
        assert_eq!(envelope.correlation_id, None);
        assert!(envelope.payload["result"].is_array());

        let calls = adapter.rest.calls.lock();
        assert_eq!(calls[0].0, "/public/get_instruments");
        assert_eq!(
            calls[0].1,
            vec![
                ("currency".to_string(), "BTC".to_string()),
                ("expired".to_string(), "false".to_string()),
                ("kind".to_string(), "option".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_instruments_cancelled() {
        let adapter = adapter();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = adapter.list_instruments("BTC", None, &cancel).await;
        assert!(matches!(result, Err(ExchangeError::Cancelled)));
    }
}
