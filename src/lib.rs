//! Time-boxed access permissions for a domain blocker.
//!
//! The crate models the runtime of a blocking product: a synced block list
//! with subdomain matching, per-domain timed allowances, a background sweeper
//! that retires expired ones, countdown badge classification, and per-page
//! re-check scheduling. Storage sits behind a small versioned key-value trait
//! so embedders can bring their own backend.

pub mod badge;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod events;
pub mod runtime;
pub mod store;
pub mod sweeper;
pub mod watcher;

pub use badge::{classify, CountdownBadge, Tier};
pub use config::Config;
pub use engine::{Access, Grant, PermissionEngine};
pub use error::{GrantError, ListError, StoreError};
pub use events::{EngineEvent, EventBus, StatsRecorder};
pub use runtime::{setup_logging, BlockOutcome, Runtime};
pub use store::{
    AllowanceRepository, BlockListRepository, MemoryBackend, Partition, SqliteBackend,
    StatsRepository, StorageBackend, Versioned,
};
pub use sweeper::{ExpirySweeper, SweepOutcome};
pub use watcher::{next_check_delay_ms, BadgeFeed, BadgeTicker, PageWatch, PageWatcher};

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch. Expiries, grants and stats timestamps
/// all share this clock.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// Owns a spawned background task and aborts it on drop, which is how
/// per-context work gets cancelled at teardown.
#[derive(Debug)]
pub struct TaskHandle {
    inner: tokio::task::JoinHandle<()>,
}

impl TaskHandle {
    pub fn new(inner: tokio::task::JoinHandle<()>) -> Self {
        Self { inner }
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    pub fn abort(&self) {
        self.inner.abort();
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.inner.abort();
    }
}
