//! `funnel-progress` - Lead-funnel progress shared across browsing contexts
//!
//! This library tracks the identifiers produced by a linear sign-up funnel
//! (chat session, registration, booking) in a shared key-value storage and
//! keeps every context that shares the storage in sync through change
//! notifications.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod funnel;
pub mod logging;
pub mod notify;
pub mod state;
pub mod storage;
pub mod store;
pub mod watch;

pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use notify::{ContextId, LocalBus, NoopNotifier, Notifier, StorageEvent};
pub use state::{FunnelField, FunnelState};
pub use storage::{KeyValueStorage, MemoryStorage, SqliteStorage};
pub use store::{FunnelStore, Subscription};
pub use watch::{StorageWatcher, WatcherHandle};
