//! Persistence layer: a versioned key-value backend trait plus typed
//! repositories for the three stored shapes.

pub mod allowance;
pub mod blocklist;
pub mod memory;
pub mod sqlite;
pub mod stats;

pub use self::allowance::AllowanceRepository;
pub use self::blocklist::BlockListRepository;
pub use self::memory::MemoryBackend;
pub use self::sqlite::SqliteBackend;
pub use self::stats::{DomainStats, StatsRepository};

use crate::error::StoreError;
use serde_json::Value;

/// Storage partition, mirroring the split between settings that roam with
/// the user profile and state that stays on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Synced,
    Local,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Synced => "synced",
            Partition::Local => "local",
        }
    }
}

/// Key of the blocked-domain list (synced partition).
pub const KEY_BLOCKED_DOMAINS: &str = "blockedDomains";
/// Key of the domain -> expiry-ms map (local partition).
pub const KEY_ALLOWED_UNTIL: &str = "allowedUntil";
/// Key of the per-domain counters map (local partition).
pub const KEY_BLOCK_STATS: &str = "blockStats";

/// A value read together with its write version. Version 0 means the key has
/// never been written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Key-value storage with per-key versions and a conditional write.
///
/// `store_if` succeeds only while the key's version still equals `expected`,
/// which is how read-modify-write callers detect racing writers. Backends
/// must bump the version on every successful write.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    async fn fetch(
        &self,
        partition: Partition,
        key: &str,
    ) -> Result<Versioned<Option<Value>>, StoreError>;

    async fn store(&self, partition: Partition, key: &str, value: Value)
        -> Result<(), StoreError>;

    async fn store_if(
        &self,
        partition: Partition,
        key: &str,
        value: Value,
        expected: u64,
    ) -> Result<bool, StoreError>;
}
