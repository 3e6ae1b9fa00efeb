use crate::core::types::RequestKind;
use dashmap::DashMap;

/// Correlation id → kind of the request still waiting for a response
#[derive(Debug, Default)]
pub struct RequestRegistry {
    pending: DashMap<u64, RequestKind>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outgoing request; re-registering an id overwrites its kind
    pub fn register(&self, id: u64, kind: RequestKind) {
        self.pending.insert(id, kind);
    }

    /// Kind of an outstanding request, `None` for unknown ids
    pub fn try_get(&self, id: u64) -> Option<RequestKind> {
        self.pending.get(&id).map(|entry| *entry.value())
    }

    /// Resolve and evict in one step, used once a response has arrived
    pub fn take(&self, id: u64) -> Option<RequestKind> {
        self.pending.remove(&id).map(|(_, kind)| kind)
    }

    pub fn remove(&self, id: u64) {
        self.pending.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
