use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tradesocket::core::config::{ConfigError, ConnectionConfig};
use tradesocket::core::kernel::{WsConfig, WsConnection, WsConnector};
use tradesocket::utils::exchange_factory::ExchangeFactory;
use tradesocket::{ConnectionState, ExchangeError, ExchangeType};

/// Connector handing out in-memory transports; keeps the server ends around
#[derive(Default)]
struct LoopbackConnector {
    urls: Mutex<Vec<String>>,
    written: Mutex<Vec<mpsc::UnboundedReceiver<Message>>>,
    feeds: Mutex<Vec<mpsc::UnboundedSender<Result<Message, ExchangeError>>>>,
}

#[async_trait]
impl WsConnector for LoopbackConnector {
    async fn connect(&self, url: &str) -> Result<WsConnection, ExchangeError> {
        let (client_tx, server_rx) = mpsc::unbounded::<Message>();
        let (server_tx, client_rx) = mpsc::unbounded::<Result<Message, ExchangeError>>();
        self.urls.lock().push(url.to_string());
        self.written.lock().push(server_rx);
        self.feeds.lock().push(server_tx);

        let sink = client_tx.sink_map_err(|e| ExchangeError::NetworkError(e.to_string()));
        Ok(WsConnection::new(Box::pin(sink), Box::pin(client_rx)))
    }
}

fn okx_only() -> Vec<ConnectionConfig> {
    vec![ConnectionConfig::read_only("okx").with_ws_url("wss://okx.test/ws".to_string())]
}

#[tokio::test]
async fn test_start_subscribe_stop() {
    let connector = Arc::new(LoopbackConnector::default());
    let service = ExchangeFactory::build_service_with(
        okx_only(),
        Arc::clone(&connector) as Arc<dyn WsConnector>,
        WsConfig::default(),
    )
    .unwrap();
    let cancel = CancellationToken::new();

    service.start(ExchangeType::Okx, &cancel).await.unwrap();
    let okx = service.client(ExchangeType::Okx).unwrap();
    assert_eq!(okx.state(), ConnectionState::Ready);
    assert_eq!(*connector.urls.lock(), vec!["wss://okx.test/ws".to_string()]);

    okx.subscribe_ticker("BTC-USDT", &cancel).await.unwrap();
    let mut written = connector.written.lock().pop().unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(2), written.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        frame,
        Message::Text(r#"{"op":"subscribe","args":["ticker:BTC-USDT"]}"#.to_string())
    );
    assert_eq!(okx.subscriptions()[0].channel, "ticker:BTC-USDT");

    service.stop(ExchangeType::Okx, &cancel).await.unwrap();
    assert_eq!(okx.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_unconfigured_venue_is_rejected() {
    let service = ExchangeFactory::build_service_with(
        okx_only(),
        Arc::new(LoopbackConnector::default()),
        WsConfig::default(),
    )
    .unwrap();

    let result = service
        .start(ExchangeType::Deribit, &CancellationToken::new())
        .await;
    assert!(matches!(
        result,
        Err(ExchangeError::ConfigError(ConfigError::UnsupportedExchange(_)))
    ));
    assert!(service.client(ExchangeType::Deribit).is_none());
}

#[tokio::test]
async fn test_deribit_start_sends_auth() {
    let connector = Arc::new(LoopbackConnector::default());
    let service = ExchangeFactory::build_service_with(
        vec![ConnectionConfig::new(
            "deribit",
            "abc".to_string(),
            "xyz".to_string(),
        )],
        Arc::clone(&connector) as Arc<dyn WsConnector>,
        WsConfig::default(),
    )
    .unwrap();

    service
        .start(ExchangeType::Deribit, &CancellationToken::new())
        .await
        .unwrap();

    let mut written = connector.written.lock().pop().unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(2), written.next())
        .await
        .unwrap()
        .unwrap();
    let Message::Text(text) = frame else {
        panic!("Expected text frame");
    };
    let body: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["method"], "public/auth");
    assert_eq!(
        *connector.urls.lock(),
        vec![ExchangeType::Deribit.default_ws_url().to_string()]
    );
}
