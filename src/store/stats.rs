use super::{Partition, StorageBackend, KEY_BLOCK_STATS};
use crate::error::StoreError;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

const CAS_ATTEMPTS: usize = 4;

/// Per-domain counters. Purely observational: nothing here is ever consulted
/// when deciding whether to block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainStats {
    pub blocked_count: u64,
    pub allowed_count: u64,
    pub last_blocked_ms: Option<u64>,
    pub total_allowed_ms: u64,
}

#[derive(Clone)]
pub struct StatsRepository {
    backend: Arc<dyn StorageBackend>,
}

impl StatsRepository {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub async fn all(&self) -> Result<HashMap<String, DomainStats>, StoreError> {
        let fetched = self.backend.fetch(Partition::Local, KEY_BLOCK_STATS).await?;
        Ok(decode_stats(fetched.value))
    }

    pub async fn for_domain(&self, host: &str) -> Result<Option<DomainStats>, StoreError> {
        Ok(self.all().await?.remove(host))
    }

    pub async fn record_blocked(&self, host: &str, now_ms: u64) -> Result<(), StoreError> {
        self.update(host, |stats| {
            stats.blocked_count += 1;
            stats.last_blocked_ms = Some(now_ms);
        })
        .await
    }

    pub async fn record_allowed(&self, host: &str, duration_ms: u64) -> Result<(), StoreError> {
        self.update(host, |stats| {
            stats.allowed_count += 1;
            stats.total_allowed_ms += duration_ms;
        })
        .await
    }

    async fn update(&self, host: &str, apply: impl Fn(&mut DomainStats)) -> Result<(), StoreError> {
        for _ in 0..CAS_ATTEMPTS {
            let fetched = self.backend.fetch(Partition::Local, KEY_BLOCK_STATS).await?;
            let version = fetched.version;
            let mut all = decode_stats(fetched.value);
            apply(all.entry(host.to_string()).or_default());

            if self
                .backend
                .store_if(Partition::Local, KEY_BLOCK_STATS, encode_stats(&all), version)
                .await?
            {
                return Ok(());
            }
        }
        Err(StoreError::Conflict)
    }
}

fn decode_stats(value: Option<Value>) -> HashMap<String, DomainStats> {
    match value {
        Some(Value::Object(entries)) => entries
            .into_iter()
            .map(|(host, entry)| (host, decode_entry(&entry)))
            .collect(),
        _ => HashMap::new(),
    }
}

// Field-by-field salvage: a malformed field resets that field, not the entry
fn decode_entry(value: &Value) -> DomainStats {
    DomainStats {
        blocked_count: value.get("blockedCount").and_then(Value::as_u64).unwrap_or(0),
        allowed_count: value.get("allowedCount").and_then(Value::as_u64).unwrap_or(0),
        last_blocked_ms: value.get("lastBlocked").and_then(Value::as_u64),
        total_allowed_ms: value
            .get("totalAllowedTime")
            .and_then(Value::as_u64)
            .unwrap_or(0),
    }
}

fn encode_stats(all: &HashMap<String, DomainStats>) -> Value {
    let mut object = Map::new();
    for (host, stats) in all {
        object.insert(host.clone(), encode_entry(stats));
    }
    Value::Object(object)
}

fn encode_entry(stats: &DomainStats) -> Value {
    let mut entry = Map::new();
    entry.insert("blockedCount".into(), Value::from(stats.blocked_count));
    entry.insert("allowedCount".into(), Value::from(stats.allowed_count));
    if let Some(ms) = stats.last_blocked_ms {
        entry.insert("lastBlocked".into(), Value::from(ms));
    }
    entry.insert("totalAllowedTime".into(), Value::from(stats.total_allowed_ms));
    Value::Object(entry)
}
