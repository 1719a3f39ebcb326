//! Polling watcher for changes made outside this process.
//!
//! Contexts in one process hear each other through a
//! [`crate::notify::LocalBus`]. Processes sharing an `SQLite` file have no
//! such channel, so a [`StorageWatcher`] periodically calls
//! [`FunnelStore::refresh`], which notifies the store's listeners when the
//! persisted payload differs from the last one they were told about.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::Config;
use crate::store::FunnelStore;

/// Shared state between a running watcher and its handles.
#[derive(Debug, Default)]
struct WatchSignal {
    stopped: AtomicBool,
    changes: AtomicU64,
    wake: Notify,
}

/// A cloneable handle controlling a running [`StorageWatcher`].
#[derive(Debug, Clone)]
pub struct WatcherHandle {
    signal: Arc<WatchSignal>,
}

impl WatcherHandle {
    /// Signal the watcher to stop; it exits before its next poll.
    pub fn stop(&self) {
        self.signal.stopped.store(true, Ordering::SeqCst);
        self.signal.wake.notify_one();
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.signal.stopped.load(Ordering::SeqCst)
    }

    /// Number of external changes detected so far.
    #[must_use]
    pub fn changes(&self) -> u64 {
        self.signal.changes.load(Ordering::SeqCst)
    }
}

/// Polls a store's backing storage for changes made by other processes.
#[derive(Debug)]
pub struct StorageWatcher {
    store: FunnelStore,
    interval: Duration,
}

impl StorageWatcher {
    /// Create a watcher polling every `interval`.
    #[must_use]
    pub fn new(store: FunnelStore, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Create a watcher using the configured poll interval.
    #[must_use]
    pub fn from_config(store: FunnelStore, config: &Config) -> Self {
        Self::new(store, config.poll_interval())
    }

    /// Poll interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start polling on the current tokio runtime.
    ///
    /// The returned task resolves to the number of changes detected once
    /// [`WatcherHandle::stop`] is called.
    #[must_use]
    pub fn spawn(self) -> (WatcherHandle, JoinHandle<u64>) {
        let signal = Arc::new(WatchSignal::default());
        let handle = WatcherHandle {
            signal: Arc::clone(&signal),
        };
        let task = tokio::spawn(self.run(signal));
        (handle, task)
    }

    async fn run(self, signal: Arc<WatchSignal>) -> u64 {
        info!(
            "Watching {} every {:?}",
            self.store.key(),
            self.interval
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = signal.wake.notified() => {}
            }
            if signal.stopped.load(Ordering::SeqCst) {
                break;
            }
            if self.store.refresh() {
                let total = signal.changes.fetch_add(1, Ordering::SeqCst) + 1;
                debug!("Detected change #{} to {}", total, self.store.key());
            }
        }

        let total = signal.changes.load(Ordering::SeqCst);
        info!("Stopped watching {} after {} changes", self.store.key(), total);
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NoopNotifier;
    use crate::storage::SqliteStorage;
    use std::sync::atomic::AtomicUsize;

    async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    #[test]
    fn test_handle_stop() {
        let handle = WatcherHandle {
            signal: Arc::new(WatchSignal::default()),
        };
        let clone = handle.clone();
        assert!(!clone.should_stop());
        handle.stop();
        assert!(clone.should_stop());
        assert_eq!(clone.changes(), 0);
    }

    #[tokio::test]
    async fn test_watcher_relays_changes_between_processes() {
        crate::logging::init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("funnel.db");

        // Two independent connections stand in for two processes.
        let reader = FunnelStore::new(
            Arc::new(SqliteStorage::open(&path).unwrap()),
            Arc::new(NoopNotifier),
        );
        let writer = FunnelStore::new(
            Arc::new(SqliteStorage::open(&path).unwrap()),
            Arc::new(NoopNotifier),
        );

        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let _sub = reader.subscribe(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let watcher = StorageWatcher::new(reader.clone(), Duration::from_millis(10));
        let (handle, task) = watcher.spawn();

        writer.set_session_id("s1").unwrap();
        assert!(wait_for(|| hits.load(Ordering::SeqCst) >= 1).await);
        assert_eq!(reader.session_id().as_deref(), Some("s1"));

        writer.set_booking_id("b1").unwrap();
        assert!(wait_for(|| hits.load(Ordering::SeqCst) >= 2).await);
        assert_eq!(reader.booking_id().as_deref(), Some("b1"));

        handle.stop();
        let total = task.await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(handle.changes(), 2);
    }

    #[tokio::test]
    async fn test_watcher_stays_quiet_without_changes() {
        let store = FunnelStore::new(
            Arc::new(SqliteStorage::open_in_memory().unwrap()),
            Arc::new(NoopNotifier),
        );
        let (handle, task) = StorageWatcher::new(store, Duration::from_millis(5)).spawn();

        tokio::time::sleep(Duration::from_millis(40)).await;
        handle.stop();
        assert_eq!(task.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stop_before_first_poll() {
        let store = FunnelStore::detached();
        let watcher = StorageWatcher::new(store, Duration::from_secs(3600));
        assert_eq!(watcher.interval(), Duration::from_secs(3600));

        let (handle, task) = watcher.spawn();
        handle.stop();
        let total = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("watcher did not stop")
            .unwrap();
        assert_eq!(total, 0);
    }

    #[test]
    fn test_from_config_uses_poll_interval() {
        let mut config = Config::default();
        config.watch.poll_interval_ms = 75;
        let watcher = StorageWatcher::from_config(FunnelStore::detached(), &config);
        assert_eq!(watcher.interval(), Duration::from_millis(75));
    }
}
