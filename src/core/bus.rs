use crate::core::errors::ExchangeError;
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use parking_lot::RwLock;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

type Callback<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber<T> {
    id: SubscriptionId,
    /// First publish sequence number this subscriber may receive
    from_seq: u64,
    callback: Callback<T>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            from_seq: self.from_seq,
            callback: Arc::clone(&self.callback),
        }
    }
}

struct Shared<T> {
    subscribers: RwLock<Vec<Subscriber<T>>>,
    published: AtomicU64,
    next_subscriber: AtomicU64,
}

/// Ordered fan-out of downstream events
///
/// Items go through a single unbounded queue drained by one background task.
/// Each item is handed to every subscriber concurrently and the next item is not
/// dequeued until all of them finish, so a slow subscriber throttles the bus.
/// Subscribers only see items published after they registered.
pub struct EventBus<T> {
    sender: mpsc::UnboundedSender<(u64, T)>,
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send + Sync + 'static> EventBus<T> {
    /// Create the bus and spawn its consumer; must run inside a tokio runtime
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            subscribers: RwLock::new(Vec::new()),
            published: AtomicU64::new(0),
            next_subscriber: AtomicU64::new(1),
        });
        tokio::spawn(Self::consume(receiver, Arc::clone(&shared)));
        Self { sender, shared }
    }

    /// Enqueue an item for delivery
    pub fn publish(&self, item: T) -> Result<(), ExchangeError> {
        let seq = self.shared.published.fetch_add(1, Ordering::SeqCst);
        self.sender
            .send((seq, item))
            .map_err(|_| ExchangeError::ChannelClosed("event bus consumer stopped".to_string()))
    }

    /// Register a callback for every item published from now on
    ///
    /// A callback that panics loses that item only; delivery to it and to the
    /// other subscribers continues with the next item.
    pub fn subscribe<F, Fut>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = SubscriptionId(self.shared.next_subscriber.fetch_add(1, Ordering::Relaxed));
        let callback: Callback<T> =
            Arc::new(move |item| -> BoxFuture<'static, ()> { Box::pin(callback(item)) });
        let mut subscribers = self.shared.subscribers.write();
        subscribers.push(Subscriber {
            id,
            from_seq: self.shared.published.load(Ordering::SeqCst),
            callback,
        });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.shared.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.id != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.read().len()
    }

    async fn consume(mut receiver: mpsc::UnboundedReceiver<(u64, T)>, shared: Arc<Shared<T>>) {
        while let Some((seq, item)) = receiver.recv().await {
            let snapshot: Vec<Subscriber<T>> = shared
                .subscribers
                .read()
                .iter()
                .filter(|subscriber| subscriber.from_seq <= seq)
                .cloned()
                .collect();

            trace!(seq, subscriber_count = snapshot.len(), "delivering bus item");
            let deliveries = snapshot.iter().map(|subscriber| {
                let callback = Arc::clone(&subscriber.callback);
                let item = item.clone();
                let id = subscriber.id;
                async move {
                    let delivered = AssertUnwindSafe(async move { callback(item).await })
                        .catch_unwind()
                        .await;
                    if delivered.is_err() {
                        error!(seq, subscriber = ?id, "bus subscriber panicked");
                    }
                }
            });
            join_all(deliveries).await;
        }
        debug!("event bus consumer stopped");
    }
}

impl<T: Clone + Send + Sync + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("published", &self.shared.published.load(Ordering::Relaxed))
            .field("subscribers", &self.shared.subscribers.read().len())
            .finish()
    }
}
