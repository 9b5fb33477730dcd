//! Change Emitter - synchronous, ordered listener list
//!
//! Every change source and registry owns one. Delivery is synchronous and in
//! subscription order; late subscribers get no replay.

use super::types::ChangeEvent;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

// ============================================================================
// Listener
// ============================================================================

/// Listener id, returned by `on` and accepted by `off`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Change listener callback
pub type ChangeListener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

// ============================================================================
// ChangeEmitter
// ============================================================================

/// Ordered list of change listeners.
///
/// The listener list is snapshotted before delivery and no lock is held while
/// a listener runs, so listeners may subscribe, unsubscribe or emit again.
pub struct ChangeEmitter {
    /// Owner name, for logs
    name: String,

    listeners: RwLock<Vec<(ListenerId, ChangeListener)>>,

    listener_counter: AtomicU64,

    /// Emitted event count
    event_count: AtomicU64,
}

impl ChangeEmitter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listeners: RwLock::new(Vec::new()),
            listener_counter: AtomicU64::new(0),
            event_count: AtomicU64::new(0),
        }
    }

    /// Subscribe a listener
    pub fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.on_shared(Arc::new(listener))
    }

    /// Subscribe an already shared listener
    pub fn on_shared(&self, listener: ChangeListener) -> ListenerId {
        let id = ListenerId::new(self.listener_counter.fetch_add(1, Ordering::SeqCst));

        debug!(emitter = %self.name, listener_id = %id, "Registering change listener");

        self.listeners.write().push((id, listener));
        id
    }

    /// Unsubscribe; returns whether the listener was registered
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        let removed = listeners.len() != before;

        if removed {
            debug!(emitter = %self.name, listener_id = %id, "Unregistered change listener");
        }

        removed
    }

    /// Deliver an event to every listener, in subscription order
    pub fn emit(&self, event: &ChangeEvent) {
        let count = self.event_count.fetch_add(1, Ordering::SeqCst);

        let listeners: Vec<ChangeListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        trace!(
            emitter = %self.name,
            event = %event,
            listeners = listeners.len(),
            "Emitting change #{}", count + 1
        );

        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Total emitted events
    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for ChangeEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeEmitter")
            .field("name", &self.name)
            .field("listeners", &self.listener_count())
            .field("events", &self.event_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
