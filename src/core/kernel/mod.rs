/// Kernel - venue-agnostic transport and session machinery
///
/// Everything in here is shared by all venues. Venue-specific behaviour is
/// supplied through [`ProtocolAdapter`] implementations under `exchanges`.
///
/// # Components
///
/// ## Transport
/// - `WsConnector`: opens WebSocket transports (`TungsteniteConnector` in production)
/// - `RestClient`: HTTP side channel (`ReqwestRest`)
///
/// ## Session
/// - `Connection`: connect/auth/receive/reconnect lifecycle over one venue
/// - `ProtocolAdapter`: per-venue frame encoding and response decoding
///
/// ## Correlation
/// - `CorrelationIdGenerator`: monotonic, time-derived request ids
/// - `RequestRegistry`: outstanding request ids and their kinds
///
/// # Example
/// ```rust,no_run
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
/// use tradesocket::core::config::ConnectionConfig;
/// use tradesocket::core::dispatcher::{EventDispatcher, HandlerRegistry};
/// use tradesocket::core::kernel::*;
/// use tradesocket::exchanges::okx::OkxAdapter;
///
/// # async fn run() -> Result<(), tradesocket::ExchangeError> {
/// let config = ConnectionConfig::read_only("okx");
/// let rest = ReqwestRest::new(config.rest_url.clone(), "okx".to_string())?;
/// let adapter = Arc::new(OkxAdapter::new(rest));
/// let dispatcher = EventDispatcher::new(Arc::new(HandlerRegistry::new()));
///
/// let connection = Connection::new(
///     config.ws_url.clone(),
///     adapter,
///     Arc::new(TungsteniteConnector::default()),
///     dispatcher,
///     WsConfig::default(),
/// );
/// let cancel = CancellationToken::new();
/// connection.connect(&cancel).await?;
/// connection.subscribe_ticker("BTC-USDT", &cancel).await?;
/// # Ok(())
/// # }
/// ```
pub mod adapter;
pub mod connection;
pub mod ids;
pub mod registry;
pub mod rest;
pub mod ws;

pub use adapter::{OutboundFrame, ProtocolAdapter};
pub use connection::Connection;
pub use ids::{CorrelationIdGenerator, FANOUT};
pub use registry::RequestRegistry;
pub use rest::{ReqwestRest, RestClient, RestClientBuilder, RestClientConfig};
pub use ws::{TungsteniteConnector, WsConfig, WsConnection, WsConnector, WsSink, WsStream};
