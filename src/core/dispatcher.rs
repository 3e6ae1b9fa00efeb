use crate::core::errors::ExchangeError;
use crate::core::types::{Envelope, ExchangeType, Ticker};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::trace;

/// Events routed through the dispatcher
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// A venue response or REST result arrived
    MessageArrived {
        exchange: ExchangeType,
        envelope: Envelope,
    },
    /// Normalized instrument information
    ContractInfo(Ticker),
}

impl DomainEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::MessageArrived { exchange, .. } => EventType::MessageArrived(*exchange),
            Self::ContractInfo(_) => EventType::ContractInfo,
        }
    }
}

/// Routing key handlers are registered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    MessageArrived(ExchangeType),
    ContractInfo,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MessageArrived(exchange) => write!(f, "{}::MessageArrived", exchange),
            Self::ContractInfo => write!(f, "ContractInfo"),
        }
    }
}

/// Receives events of the type it is registered under
///
/// The dispatcher is handed in so a handler can raise follow-up events, for
/// example one `ContractInfo` per instrument of a decoded instrument list.
#[async_trait]
pub trait DomainEventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent, dispatcher: &EventDispatcher) -> Result<(), ExchangeError>;
}

/// Adapter turning an async closure into a handler
pub struct FnHandler<F>(F);

/// Wrap `f` as a handler; the closure receives its own copy of the event
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn DomainEventHandler>
where
    F: Fn(DomainEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ExchangeError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[async_trait]
impl<F, Fut> DomainEventHandler for FnHandler<F>
where
    F: Fn(DomainEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ExchangeError>> + Send,
{
    async fn handle(&self, event: &DomainEvent, _dispatcher: &EventDispatcher) -> Result<(), ExchangeError> {
        (self.0)(event.clone()).await
    }
}

/// Handler table populated once at startup
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<EventType, Vec<Arc<dyn DomainEventHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler; handlers for one event type run in registration order
    #[must_use]
    pub fn register(mut self, event_type: EventType, handler: Arc<dyn DomainEventHandler>) -> Self {
        self.handlers.entry(event_type).or_default().push(handler);
        self
    }

    pub fn handlers(&self, event_type: EventType) -> &[Arc<dyn DomainEventHandler>] {
        self.handlers.get(&event_type).map_or(&[], Vec::as_slice)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<String, usize> = self
            .handlers
            .iter()
            .map(|(event_type, list)| (event_type.to_string(), list.len()))
            .collect();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &counts)
            .finish()
    }
}

/// Delivers events to the handlers registered for their type
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    registry: Arc<HandlerRegistry>,
}

impl EventDispatcher {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    /// Run every handler for the event's type, one after another
    ///
    /// An event type with no handlers is a wiring mistake and fails with
    /// [`ExchangeError::NoHandler`]. The first handler error stops dispatch; later
    /// handlers are not invoked.
    pub async fn dispatch(&self, event: DomainEvent) -> Result<(), ExchangeError> {
        let event_type = event.event_type();
        let handlers = self.registry.handlers(event_type);
        if handlers.is_empty() {
            return Err(ExchangeError::NoHandler(event_type.to_string()));
        }

        trace!(event_type = %event_type, handler_count = handlers.len(), "dispatching event");
        for handler in handlers {
            handler.handle(&event, self).await?;
        }
        Ok(())
    }
}
