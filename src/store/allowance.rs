use super::{Partition, StorageBackend, Versioned, KEY_ALLOWED_UNTIL};
use crate::error::StoreError;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

const CAS_ATTEMPTS: usize = 4;

/// Typed access to the domain -> expiry-ms map in the local partition.
#[derive(Clone)]
pub struct AllowanceRepository {
    backend: Arc<dyn StorageBackend>,
}

impl AllowanceRepository {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// The full map plus the version to hand back to `replace_if`. Entries
    /// whose expiry is not a number are dropped on read.
    pub async fn snapshot(&self) -> Result<Versioned<HashMap<String, u64>>, StoreError> {
        let fetched = self.backend.fetch(Partition::Local, KEY_ALLOWED_UNTIL).await?;
        Ok(Versioned {
            value: decode_map(fetched.value),
            version: fetched.version,
        })
    }

    pub async fn expiry_for(&self, host: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.snapshot().await?.value.get(host).copied())
    }

    /// Sets the expiry for one domain, replacing any previous entry. Retries
    /// around racing writers.
    pub async fn put(&self, host: &str, expires_at_ms: u64) -> Result<(), StoreError> {
        for _ in 0..CAS_ATTEMPTS {
            let Versioned { mut value, version } = self.snapshot().await?;
            value.insert(host.to_string(), expires_at_ms);
            if self
                .backend
                .store_if(Partition::Local, KEY_ALLOWED_UNTIL, encode_map(&value), version)
                .await?
            {
                return Ok(());
            }
        }
        Err(StoreError::Conflict)
    }

    /// Conditional whole-map replacement; the sweeper's writeback primitive.
    pub async fn replace_if(
        &self,
        map: &HashMap<String, u64>,
        version: u64,
    ) -> Result<bool, StoreError> {
        self.backend
            .store_if(Partition::Local, KEY_ALLOWED_UNTIL, encode_map(map), version)
            .await
    }
}

fn decode_map(value: Option<Value>) -> HashMap<String, u64> {
    match value {
        Some(Value::Object(entries)) => entries
            .into_iter()
            .filter_map(|(host, v)| v.as_u64().map(|ms| (host, ms)))
            .collect(),
        _ => HashMap::new(),
    }
}

fn encode_map(map: &HashMap<String, u64>) -> Value {
    let mut object = Map::new();
    for (host, ms) in map {
        object.insert(host.clone(), Value::from(*ms));
    }
    Value::Object(object)
}
