//! The funnel progress store.
//!
//! A [`FunnelStore`] is one context's handle onto the funnel state persisted
//! in a [`KeyValueStorage`]. Every funnel step reads the identifiers written
//! by earlier steps and writes its own once known; the persisted payload is
//! the only source of truth.
//!
//! Reads are reference-stable: [`FunnelStore::read`] returns the same
//! [`Arc`] for as long as the raw stored payload is unchanged, so a view
//! layer comparing snapshots by pointer only re-renders on real changes.
//!
//! Writes announce themselves twice: the writing context's own listeners
//! are invoked directly, and a [`StorageEvent`] goes through the
//! [`Notifier`] to every other context sharing the storage.
//!
//! Storage failures never reach the end user. A failed read behaves like
//! an empty funnel; a failed write returns an error and leaves the
//! persisted state exactly as it was.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::notify::{ContextId, EventHandler, NoopNotifier, Notifier, StorageEvent};
use crate::state::{FunnelField, FunnelState};
use crate::storage::KeyValueStorage;

/// Storage key used when none is configured.
pub const DEFAULT_STORAGE_KEY: &str = "mvpg-funnel-progress";

/// Callback invoked whenever the funnel state may have changed.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Last parsed payload, keyed by the raw string it came from.
struct SnapshotCache {
    raw: Option<String>,
    state: Arc<FunnelState>,
}

struct Inner {
    key: String,
    context: ContextId,
    /// `None` in contexts without persistent storage, such as prerendering.
    storage: Option<Arc<dyn KeyValueStorage>>,
    notifier: Arc<dyn Notifier>,
    empty: Arc<FunnelState>,
    cache: Mutex<SnapshotCache>,
    /// Raw payload as of the last change listeners were told about.
    /// Outer `None` means not yet known.
    observed: Mutex<Option<Option<String>>>,
    /// Serializes read-merge-write cycles between clones of this context.
    write_lock: Mutex<()>,
    listeners: Mutex<BTreeMap<u64, Listener>>,
    next_listener: AtomicU64,
}

impl Inner {
    fn emit(&self) {
        let listeners: Vec<Listener> = match self.listeners.lock() {
            Ok(listeners) => listeners.values().cloned().collect(),
            Err(_) => {
                warn!("{} listener registry poisoned", self.context);
                return;
            }
        };
        trace!("{} notifying {} listeners", self.context, listeners.len());
        for listener in listeners {
            listener();
        }
    }

    fn set_observed(&self, raw: Option<String>) {
        if let Ok(mut observed) = self.observed.lock() {
            *observed = Some(raw);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.notifier.detach(self.context);
    }
}

/// Handle onto the shared funnel progress.
///
/// Cloning is cheap; clones belong to the same context and share a
/// snapshot cache and listener set.
#[derive(Clone)]
pub struct FunnelStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for FunnelStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunnelStore")
            .field("key", &self.inner.key)
            .field("context", &self.inner.context)
            .field("has_storage", &self.inner.storage.is_some())
            .field("notifier", &self.inner.notifier)
            .finish_non_exhaustive()
    }
}

impl FunnelStore {
    /// Create a store under [`DEFAULT_STORAGE_KEY`].
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStorage>, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_key(DEFAULT_STORAGE_KEY, storage, notifier)
    }

    /// Create a store persisting under `key`.
    #[must_use]
    pub fn with_key(
        key: impl Into<String>,
        storage: Arc<dyn KeyValueStorage>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::build(key.into(), Some(storage), notifier)
    }

    /// Create a store using the key configured in `config`.
    #[must_use]
    pub fn from_config(
        config: &Config,
        storage: Arc<dyn KeyValueStorage>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_key(config.storage.key.clone(), storage, notifier)
    }

    /// Create a store for a context with no persistent storage.
    ///
    /// Reads always return the empty state and writes fail with
    /// [`Error::StorageUnavailable`].
    #[must_use]
    pub fn detached() -> Self {
        Self::build(DEFAULT_STORAGE_KEY.to_string(), None, Arc::new(NoopNotifier))
    }

    fn build(
        key: String,
        storage: Option<Arc<dyn KeyValueStorage>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let empty = Arc::new(FunnelState::default());
        let observed = storage
            .as_ref()
            .and_then(|storage| storage.get_item(&key).ok());

        let inner = Arc::new(Inner {
            key,
            context: ContextId::next(),
            storage,
            notifier,
            cache: Mutex::new(SnapshotCache {
                raw: None,
                state: Arc::clone(&empty),
            }),
            empty,
            observed: Mutex::new(observed),
            write_lock: Mutex::new(()),
            listeners: Mutex::new(BTreeMap::new()),
            next_listener: AtomicU64::new(0),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let handler: EventHandler = Arc::new(move |event: &StorageEvent| {
            if let Some(inner) = weak.upgrade() {
                if event.affects(&inner.key) {
                    trace!("{} received change from {}", inner.context, event.origin);
                    inner.emit();
                }
            }
        });
        inner.notifier.attach(inner.context, handler);

        debug!("Created funnel store {} for key {}", inner.context, inner.key);
        Self { inner }
    }

    /// The storage key this store persists under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// This store's context id.
    #[must_use]
    pub fn context(&self) -> ContextId {
        self.inner.context
    }

    /// Current funnel state.
    ///
    /// Returns the same `Arc` as the previous call when the stored payload
    /// has not changed. Falls back to the empty state if storage is missing,
    /// unreadable, or holds a malformed payload.
    #[must_use]
    pub fn read(&self) -> Arc<FunnelState> {
        self.load()
    }

    /// Alias of [`read`](Self::read) for subscribe/snapshot style consumers.
    #[must_use]
    pub fn snapshot(&self) -> Arc<FunnelState> {
        self.read()
    }

    /// Recorded chat session id.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.read().session_id.clone()
    }

    /// Recorded registration id.
    #[must_use]
    pub fn registration_id(&self) -> Option<String> {
        self.read().registration_id.clone()
    }

    /// Recorded booking id.
    #[must_use]
    pub fn booking_id(&self) -> Option<String> {
        self.read().booking_id.clone()
    }

    /// Record the chat session id.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be read or written; nothing is
    /// persisted or announced in that case.
    pub fn set_session_id(&self, id: impl Into<String>) -> Result<()> {
        self.set(FunnelField::Session, id)
    }

    /// Record the registration id.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be read or written; nothing is
    /// persisted or announced in that case.
    pub fn set_registration_id(&self, id: impl Into<String>) -> Result<()> {
        self.set(FunnelField::Registration, id)
    }

    /// Record the booking id.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be read or written; nothing is
    /// persisted or announced in that case.
    pub fn set_booking_id(&self, id: impl Into<String>) -> Result<()> {
        self.set(FunnelField::Booking, id)
    }

    /// Record `id` for `field`, leaving the other fields as persisted.
    ///
    /// The latest payload is re-read from storage immediately before the
    /// merge, never taken from the snapshot cache, so back-to-back setters
    /// cannot overwrite each other.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be read or written.
    pub fn set(&self, field: FunnelField, id: impl Into<String>) -> Result<()> {
        let id = id.into();
        self.write_field(field, &id).map_err(|err| {
            warn!("Failed to record {} id in {}: {}", field, self.inner.key, err);
            err
        })
    }

    fn write_field(&self, field: FunnelField, id: &str) -> Result<()> {
        let storage = self.storage()?;
        let key = &self.inner.key;

        {
            let _guard = self.write_guard()?;
            let current = match storage.get_item(key)? {
                None => FunnelState::default(),
                Some(raw) => FunnelState::from_json(&raw).unwrap_or_else(|err| {
                    warn!("Replacing malformed funnel payload in {}: {}", key, err);
                    FunnelState::default()
                }),
            };

            let payload = current.with(field, id).to_json()?;
            storage.set_item(key, &payload)?;
            self.inner.set_observed(Some(payload));
        }

        // Listeners run unlocked so they may write again.
        debug!("Recorded {} id {} in {}", field, id, key);
        self.announce(StorageEvent::changed(key.clone(), self.inner.context));
        Ok(())
    }

    /// Delete the persisted state entirely.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be written; the previous state is
    /// kept in that case.
    pub fn reset(&self) -> Result<()> {
        let result = self.storage().and_then(|storage| {
            let _guard = self.write_guard()?;
            storage.remove_item(&self.inner.key)?;
            self.inner.set_observed(None);
            Ok(())
        });

        match result {
            Ok(()) => {
                debug!("Reset funnel progress in {}", self.inner.key);
                self.announce(StorageEvent::changed(
                    self.inner.key.clone(),
                    self.inner.context,
                ));
                Ok(())
            }
            Err(err) => {
                warn!("Failed to reset {}: {}", self.inner.key, err);
                Err(err)
            }
        }
    }

    /// Remove every key in the backing storage, not just this store's.
    ///
    /// Other contexts sharing the storage are sent a whole-storage clear
    /// event, which every store reacts to whatever its key.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be written.
    pub fn clear_storage(&self) -> Result<()> {
        let result = self.storage().and_then(|storage| {
            let _guard = self.write_guard()?;
            storage.clear()?;
            self.inner.set_observed(None);
            Ok(())
        });

        match result {
            Ok(()) => {
                debug!("Cleared storage behind {}", self.inner.key);
                self.announce(StorageEvent::cleared(self.inner.context));
                Ok(())
            }
            Err(err) => {
                warn!("Failed to clear storage behind {}: {}", self.inner.key, err);
                Err(err)
            }
        }
    }

    /// Register `listener` to run whenever the funnel state may have changed.
    ///
    /// Listeners run on the thread that made or relayed the change and
    /// should re-read via [`read`](Self::read). The listener stays registered
    /// until the returned [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        match self.inner.listeners.lock() {
            Ok(mut listeners) => {
                listeners.insert(id, Arc::new(listener));
            }
            Err(_) => warn!("{} listener registry poisoned", self.inner.context),
        }
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().map_or(0, |l| l.len())
    }

    /// Re-check storage and notify listeners if the payload changed since
    /// listeners were last told about it.
    ///
    /// Used by polling watchers for writers that cannot reach this context's
    /// notifier, such as other processes sharing a database file. Returns
    /// whether a change was detected.
    pub fn refresh(&self) -> bool {
        let Some(storage) = self.inner.storage.as_ref() else {
            return false;
        };

        let raw = match storage.get_item(&self.inner.key) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("Failed to poll {}: {}", self.inner.key, err);
                return false;
            }
        };

        let changed = match self.inner.observed.lock() {
            Ok(mut observed) => {
                // An unknown baseline is recorded silently.
                let changed = observed.as_ref().is_some_and(|previous| *previous != raw);
                if changed || observed.is_none() {
                    *observed = Some(raw);
                }
                changed
            }
            Err(_) => false,
        };

        if changed {
            debug!("{} detected external change to {}", self.inner.context, self.inner.key);
            self.inner.emit();
        }
        changed
    }

    fn write_guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.inner
            .write_lock
            .lock()
            .map_err(|_| Error::internal("funnel write lock poisoned"))
    }

    fn storage(&self) -> Result<&Arc<dyn KeyValueStorage>> {
        self.inner
            .storage
            .as_ref()
            .ok_or_else(|| Error::unavailable("no persistent storage in this context"))
    }

    fn announce(&self, event: StorageEvent) {
        // The native signal never reaches the writer, so local listeners
        // are invoked directly.
        self.inner.emit();
        self.inner.notifier.broadcast(&event);
    }

    fn load(&self) -> Arc<FunnelState> {
        let Some(storage) = self.inner.storage.as_ref() else {
            return Arc::clone(&self.inner.empty);
        };

        let raw = match storage.get_item(&self.inner.key) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("Failed to read {}: {}", self.inner.key, err);
                return Arc::clone(&self.inner.empty);
            }
        };

        let Ok(mut cache) = self.inner.cache.lock() else {
            return Arc::clone(&self.inner.empty);
        };
        if cache.raw == raw {
            return Arc::clone(&cache.state);
        }

        let state = match raw.as_deref() {
            None => Arc::clone(&self.inner.empty),
            Some(payload) => match FunnelState::from_json(payload) {
                Ok(state) => Arc::new(state),
                Err(err) => {
                    warn!("Ignoring malformed funnel payload in {}: {}", self.inner.key, err);
                    Arc::clone(&self.inner.empty)
                }
            },
        };
        cache.raw = raw;
        cache.state = Arc::clone(&state);
        state
    }
}

/// Keeps a listener registered; dropping it unsubscribes.
#[must_use = "dropping the subscription unsubscribes the listener"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    /// Unsubscribe now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            if let Ok(mut listeners) = inner.listeners.lock() {
                listeners.remove(&self.id);
            }
        }
    }
}
