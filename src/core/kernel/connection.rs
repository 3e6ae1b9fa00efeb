use crate::core::dispatcher::{DomainEvent, EventDispatcher};
use crate::core::errors::ExchangeError;
use crate::core::kernel::adapter::ProtocolAdapter;
use crate::core::kernel::ws::{WsConfig, WsConnection, WsConnector, WsSink, WsStream};
use crate::core::types::{ConnectionState, InstrumentKind, Subscription, Visibility};
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

/// Write side of the live transport
struct Transport {
    id: u64,
    sink: WsSink,
    /// Cleared once the peer's close frame has been seen
    open: bool,
}

/// A subscription as the caller issued it, kept for explicit replay
#[derive(Debug, Clone)]
struct Recorded {
    subscription: Subscription,
    target: String,
}

struct Inner<A: ProtocolAdapter> {
    adapter: Arc<A>,
    connector: Arc<dyn WsConnector>,
    dispatcher: EventDispatcher,
    ws_url: String,
    config: WsConfig,
    transport: AsyncMutex<Option<Transport>>,
    /// Held for the whole of a connect, so only one transport is ever opened at a time
    connect_lock: AsyncMutex<()>,
    state: watch::Sender<ConnectionState>,
    /// Whole-connection scope, cancelled only by `close`
    connection_token: CancellationToken,
    /// Scope of the current receive loop, replaced with every transport
    receive_token: Mutex<CancellationToken>,
    subscriptions: Mutex<Vec<Recorded>>,
}

/// Lifecycle engine for one venue connection
///
/// Owns the transport and drives connect, authenticate, receive and reconnect.
/// Everything venue specific goes through the [`ProtocolAdapter`]. Inbound
/// responses are dispatched as [`DomainEvent::MessageArrived`].
///
/// Reconnects replace the transport and re-authenticate when the adapter
/// requires it, but subscriptions are not replayed; call
/// [`Connection::resubscribe`] for that.
pub struct Connection<A: ProtocolAdapter> {
    inner: Arc<Inner<A>>,
}

impl<A: ProtocolAdapter> Clone for Connection<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: ProtocolAdapter> Connection<A> {
    pub fn new(
        ws_url: String,
        adapter: Arc<A>,
        connector: Arc<dyn WsConnector>,
        dispatcher: EventDispatcher,
        config: WsConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let connection_token = CancellationToken::new();
        let receive_token = connection_token.child_token();
        Self {
            inner: Arc::new(Inner {
                adapter,
                connector,
                dispatcher,
                ws_url,
                config,
                transport: AsyncMutex::new(None),
                connect_lock: AsyncMutex::new(()),
                state,
                connection_token,
                receive_token: Mutex::new(receive_token),
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn adapter(&self) -> &Arc<A> {
        &self.inner.adapter
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch lifecycle transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Identity of the current transport, `None` while disconnected
    pub async fn transport_id(&self) -> Option<u64> {
        self.inner.transport.lock().await.as_ref().map(|t| t.id)
    }

    pub async fn is_open(&self) -> bool {
        self.inner.is_open().await
    }

    /// Connect, retrying every `reconnect_delay` until success or cancellation
    ///
    /// Authenticates afterwards when the adapter requires it. Only cancellation
    /// (of `cancel` or of the connection itself) ends the retry loop.
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<(), ExchangeError> {
        self.inner.connect(cancel).await
    }

    pub async fn authenticate(&self, cancel: &CancellationToken) -> Result<(), ExchangeError> {
        self.inner.authenticate(cancel).await
    }

    /// Best-effort write of one frame
    ///
    /// Only cancellation is reported; transport failures are logged and dropped.
    /// Delivery must be confirmed through the correlated response.
    pub async fn send(&self, message: Message, cancel: &CancellationToken) -> Result<(), ExchangeError> {
        self.inner.send(message, cancel).await
    }

    pub async fn subscribe_private(
        &self,
        channel: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ExchangeError> {
        let frame = self.inner.adapter.build_subscribe_private(channel)?;
        self.inner.record(channel.to_string(), channel, Visibility::Private);
        debug!(exchange = self.inner.adapter.name(), channel, correlation_id = ?frame.id, "subscribing to private channel");
        self.inner.send(frame.message, cancel).await
    }

    pub async fn subscribe_ticker(
        &self,
        instrument: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ExchangeError> {
        let frame = self.inner.adapter.build_subscribe_ticker(instrument)?;
        let channel = self.inner.adapter.ticker_channel(instrument);
        self.inner.record(channel, instrument, Visibility::Public);
        debug!(exchange = self.inner.adapter.name(), instrument, correlation_id = ?frame.id, "subscribing to ticker");
        self.inner.send(frame.message, cancel).await
    }

    /// Subscriptions issued on this connection so far
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.inner
            .subscriptions
            .lock()
            .iter()
            .map(|recorded| recorded.subscription.clone())
            .collect()
    }

    /// Re-send every recorded subscription, typically after a reconnect
    pub async fn resubscribe(&self, cancel: &CancellationToken) -> Result<(), ExchangeError> {
        let recorded = self.inner.subscriptions.lock().clone();
        for entry in recorded {
            let frame = match entry.subscription.visibility {
                Visibility::Private => self.inner.adapter.build_subscribe_private(&entry.target)?,
                Visibility::Public => self.inner.adapter.build_subscribe_ticker(&entry.target)?,
            };
            self.inner.send(frame.message, cancel).await?;
        }
        Ok(())
    }

    /// Fetch instruments over REST and dispatch the result as a message
    #[instrument(skip(self, cancel), fields(exchange = self.inner.adapter.name()))]
    pub async fn list_instruments(
        &self,
        currency: &str,
        kind: Option<InstrumentKind>,
        cancel: &CancellationToken,
    ) -> Result<(), ExchangeError> {
        let inner = &self.inner;
        let envelope = inner
            .cancellable(cancel, inner.adapter.list_instruments(currency, kind, cancel))
            .await??;
        inner
            .dispatcher
            .dispatch(DomainEvent::MessageArrived {
                exchange: inner.adapter.exchange(),
                envelope,
            })
            .await
    }

    /// Stop receiving, send a normal closure and tear the connection down
    ///
    /// The connection cannot be reused afterwards.
    pub async fn close(&self, cancel: &CancellationToken) -> Result<(), ExchangeError> {
        let inner = &self.inner;
        let name = inner.adapter.name();
        inner.receive_token.lock().cancel();
        inner.set_state(ConnectionState::Closing);

        let result = inner
            .cancellable(cancel, async {
                let mut guard = inner.transport.lock().await;
                if let Some(transport) = guard.as_mut() {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "Closing".into(),
                    };
                    if let Err(e) = transport.sink.send(Message::Close(Some(frame))).await {
                        debug!(exchange = name, error = %e, "close frame not delivered");
                    }
                }
            })
            .await;

        inner.connection_token.cancel();
        inner.transport.lock().await.take();
        inner.set_state(ConnectionState::Disconnected);
        info!(exchange = name, "Socket {} client stopped", name);
        result
    }
}

impl<A: ProtocolAdapter> Inner<A> {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(exchange = self.adapter.name(), from = %previous, to = %state, "connection state changed");
        }
    }

    fn record(&self, channel: String, target: &str, visibility: Visibility) {
        let subscription = Subscription {
            channel,
            visibility,
            exchange: self.adapter.exchange(),
        };
        let mut subscriptions = self.subscriptions.lock();
        if !subscriptions.iter().any(|r| r.subscription == subscription) {
            subscriptions.push(Recorded {
                subscription,
                target: target.to_string(),
            });
        }
    }

    async fn is_open(&self) -> bool {
        self.transport.lock().await.as_ref().is_some_and(|t| t.open)
    }

    /// Run `fut` unless the caller or the whole connection is cancelled first
    async fn cancellable<F: Future>(
        &self,
        cancel: &CancellationToken,
        fut: F,
    ) -> Result<F::Output, ExchangeError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ExchangeError::Cancelled),
            () = self.connection_token.cancelled() => Err(ExchangeError::Cancelled),
            output = fut => Ok(output),
        }
    }

    fn is_cancelled(&self, cancel: &CancellationToken) -> bool {
        cancel.is_cancelled() || self.connection_token.is_cancelled()
    }

    async fn connect(self: &Arc<Self>, cancel: &CancellationToken) -> Result<(), ExchangeError> {
        let _connecting = self.cancellable(cancel, self.connect_lock.lock()).await?;
        self.connect_locked(cancel).await
    }

    /// Retry loop behind `connect`; the caller holds `connect_lock`
    async fn connect_locked(self: &Arc<Self>, cancel: &CancellationToken) -> Result<(), ExchangeError> {
        let name = self.adapter.name();
        loop {
            if self.is_cancelled(cancel) {
                warn!(exchange = name, "{}: Connection attempt canceled.", name);
                return Err(ExchangeError::Cancelled);
            }
            if self.is_open().await {
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting);
            let attempt = match self.cancellable(cancel, self.connector.connect(&self.ws_url)).await {
                Ok(attempt) => attempt,
                Err(e) => {
                    warn!(exchange = name, "{}: Connection attempt canceled.", name);
                    return Err(e);
                }
            };

            match attempt {
                Ok(connection) => {
                    let transport_id = connection.id;
                    self.install(connection).await;
                    self.set_state(ConnectionState::Connected);
                    info!(exchange = name, transport_id, "Connected to {} WebSocket API.", name);

                    if self.adapter.requires_auth() {
                        self.authenticate(cancel).await?;
                    } else {
                        self.set_state(ConnectionState::Ready);
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        exchange = name,
                        error = %e,
                        delay_ms = self.config.reconnect_delay_ms,
                        "{}: Connection failed, retrying",
                        name
                    );
                    if self
                        .cancellable(cancel, tokio::time::sleep(self.config.reconnect_delay()))
                        .await
                        .is_err()
                    {
                        warn!(exchange = name, "{}: Connection attempt canceled.", name);
                        return Err(ExchangeError::Cancelled);
                    }
                }
            }
        }
    }

    async fn authenticate(&self, cancel: &CancellationToken) -> Result<(), ExchangeError> {
        self.set_state(ConnectionState::Authenticating);
        let frame = match self.adapter.build_auth_request() {
            Ok(frame) => frame,
            Err(e) => {
                self.set_state(ConnectionState::Connected);
                return Err(e);
            }
        };
        debug!(exchange = self.adapter.name(), correlation_id = ?frame.id, "sending authentication request");
        self.send(frame.message, cancel).await?;
        self.set_state(ConnectionState::Ready);
        Ok(())
    }

    async fn send(&self, message: Message, cancel: &CancellationToken) -> Result<(), ExchangeError> {
        let name = self.adapter.name();
        let outcome = self
            .cancellable(cancel, async {
                let mut guard = self.transport.lock().await;
                match guard.as_mut() {
                    Some(transport) if transport.open => transport.sink.send(message).await,
                    _ => Err(ExchangeError::NetworkError(
                        "WebSocket not connected".to_string(),
                    )),
                }
            })
            .await;

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(exchange = name, error = %e, "{}: Send failed", name);
                Ok(())
            }
            Err(e) => {
                warn!(exchange = name, "{}: Send attempt canceled.", name);
                Err(e)
            }
        }
    }

    /// Swap in a new transport and start its receive loop
    ///
    /// The previous receive loop is cancelled so it cannot outlive its socket.
    async fn install(self: &Arc<Self>, connection: WsConnection) {
        let WsConnection { id, sink, stream } = connection;
        let token = self.connection_token.child_token();
        let previous = std::mem::replace(&mut *self.receive_token.lock(), token.clone());
        previous.cancel();
        *self.transport.lock().await = Some(Transport {
            id,
            sink,
            open: true,
        });
        tokio::spawn(receive_loop(Arc::clone(self), stream, token, id));
    }

    async fn acknowledge_close(&self, transport_id: u64, cancel: &CancellationToken) {
        let acknowledged = self
            .cancellable(cancel, async {
                let mut guard = self.transport.lock().await;
                match guard.as_mut() {
                    Some(transport) if transport.id == transport_id => {
                        transport.open = false;
                        transport.sink.send(Message::Close(None)).await
                    }
                    _ => Ok(()),
                }
            })
            .await;
        if let Ok(Err(e)) = acknowledged {
            debug!(exchange = self.adapter.name(), error = %e, "close acknowledgement not delivered");
        }
    }

    /// Replace the transport read by the loop owning `receive_token`
    ///
    /// Does nothing once that loop has been superseded or stopped.
    async fn reconnect(self: &Arc<Self>, receive_token: &CancellationToken) {
        let name = self.adapter.name();
        let cancel = &self.connection_token;
        let Ok(_connecting) = self.cancellable(cancel, self.connect_lock.lock()).await else {
            debug!(exchange = name, "{}: Reconnect canceled", name);
            return;
        };
        if receive_token.is_cancelled() {
            debug!(exchange = name, "{}: Transport already replaced, not reconnecting", name);
            return;
        }

        self.set_state(ConnectionState::Reconnecting);
        self.transport.lock().await.take();
        self.adapter.reset_session();

        match self.connect_locked(cancel).await {
            Ok(()) => info!(exchange = name, "{}: Reconnected", name),
            Err(e) if e.is_cancelled() => debug!(exchange = name, "{}: Reconnect canceled", name),
            Err(e) => error!(exchange = name, error = %e, "{}: Reconnect failed", name),
        }
    }

    async fn process_text(&self, text: &str) {
        let name = self.adapter.name();
        match self.adapter.parse_response(text) {
            Ok(Some(envelope)) => {
                let event = DomainEvent::MessageArrived {
                    exchange: self.adapter.exchange(),
                    envelope,
                };
                if let Err(e) = self.dispatcher.dispatch(event).await {
                    error!(exchange = name, error = %e, "failed to dispatch inbound message");
                }
            }
            Ok(None) => trace!(exchange = name, "frame ignored"),
            Err(ExchangeError::Unsupported(what)) => {
                trace!(exchange = name, what = %what, "inbound parsing not supported");
            }
            Err(e) => warn!(exchange = name, error = %e, "dropping malformed frame"),
        }
    }
}

/// Reads one transport until it closes, fails or is cancelled
///
/// A close or failure hands over to `reconnect`, which installs a new transport
/// with its own loop; this loop then ends.
fn receive_loop<A: ProtocolAdapter>(
    inner: Arc<Inner<A>>,
    mut stream: WsStream,
    token: CancellationToken,
    transport_id: u64,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let name = inner.adapter.name();
        loop {
            let next = tokio::select! {
                () = token.cancelled() => {
                    debug!(exchange = name, transport_id, "{}: Receive operation canceled.", name);
                    return;
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(Message::Text(text))) => {
                    trace!(exchange = name, transport_id, "{}: Received: {}", name, text);
                    inner.process_text(&text).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    warn!(
                        exchange = name,
                        transport_id,
                        frame = ?frame,
                        "WebSocket {} connection closed. Attempting to reconnect...",
                        name
                    );
                    inner.acknowledge_close(transport_id, &token).await;
                    inner.reconnect(&token).await;
                    return;
                }
                // ping/pong and binary frames carry nothing for the adapters
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    if token.is_cancelled() {
                        debug!(exchange = name, transport_id, "{}: Receive operation canceled.", name);
                        return;
                    }
                    error!(exchange = name, transport_id, error = %e, "{} Receive failed. Attempting to reconnect...", name);
                    inner.reconnect(&token).await;
                    return;
                }
                None => {
                    if token.is_cancelled() {
                        return;
                    }
                    error!(exchange = name, transport_id, "{}: Stream ended. Attempting to reconnect...", name);
                    inner.reconnect(&token).await;
                    return;
                }
            }
        }
    })
}
