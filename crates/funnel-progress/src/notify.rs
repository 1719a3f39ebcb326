//! Cross-context change notification.
//!
//! A "context" is one handle onto shared storage, the way a browser tab is
//! one view onto its origin's local storage. When a context writes, every
//! *other* context attached to the same [`Notifier`] receives a
//! [`StorageEvent`]; the writing context never hears its own event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{trace, warn};

/// Identifies one context attached to shared storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocate a process-unique context id.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// A change to shared storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// The key that changed, or `None` when all storage was cleared.
    pub key: Option<String>,
    /// The context that made the change.
    pub origin: ContextId,
}

impl StorageEvent {
    /// An event for a single key.
    #[must_use]
    pub fn changed(key: impl Into<String>, origin: ContextId) -> Self {
        Self {
            key: Some(key.into()),
            origin,
        }
    }

    /// An event for a full clear.
    #[must_use]
    pub fn cleared(origin: ContextId) -> Self {
        Self { key: None, origin }
    }

    /// Check whether this event can affect `key`.
    #[must_use]
    pub fn affects(&self, key: &str) -> bool {
        self.key.as_deref().map_or(true, |k| k == key)
    }
}

/// Callback invoked for events from other contexts.
pub type EventHandler = Arc<dyn Fn(&StorageEvent) + Send + Sync>;

/// Delivers storage events between contexts.
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Register `context` to receive events from other contexts.
    ///
    /// Attaching the same context twice replaces its handler.
    fn attach(&self, context: ContextId, handler: EventHandler);

    /// Stop delivering events to `context`.
    fn detach(&self, context: ContextId);

    /// Deliver `event` to every attached context except `event.origin`.
    fn broadcast(&self, event: &StorageEvent);
}

/// In-process event bus for contexts sharing one storage.
///
/// Handlers run synchronously on the broadcasting thread, after the bus's
/// lock has been released, so a handler may attach or broadcast in turn.
#[derive(Clone, Default)]
pub struct LocalBus {
    handlers: Arc<Mutex<HashMap<ContextId, EventHandler>>>,
}

impl LocalBus {
    /// Create a bus with no attached contexts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attached contexts.
    #[must_use]
    pub fn attached(&self) -> usize {
        self.handlers.lock().map_or(0, |h| h.len())
    }
}

impl std::fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBus")
            .field("attached", &self.attached())
            .finish()
    }
}

impl Notifier for LocalBus {
    fn attach(&self, context: ContextId, handler: EventHandler) {
        match self.handlers.lock() {
            Ok(mut handlers) => {
                handlers.insert(context, handler);
            }
            Err(_) => warn!("notification bus lock poisoned; {} not attached", context),
        }
    }

    fn detach(&self, context: ContextId) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.remove(&context);
        }
    }

    fn broadcast(&self, event: &StorageEvent) {
        let targets: Vec<EventHandler> = match self.handlers.lock() {
            Ok(handlers) => handlers
                .iter()
                .filter(|(id, _)| **id != event.origin)
                .map(|(_, handler)| Arc::clone(handler))
                .collect(),
            Err(_) => {
                warn!("notification bus lock poisoned; dropping event");
                return;
            }
        };

        trace!(
            "broadcasting {:?} from {} to {} contexts",
            event.key,
            event.origin,
            targets.len()
        );
        for handler in targets {
            handler(event);
        }
    }
}

/// A notifier for environments without cross-context signalling.
///
/// Same-context readers still see every write, since reads always consult
/// storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn attach(&self, _context: ContextId, _handler: EventHandler) {}

    fn detach(&self, _context: ContextId) {}

    fn broadcast(&self, _event: &StorageEvent) {}
}
