use super::{Partition, StorageBackend, Versioned};
use crate::error::StoreError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

/// Process-local backend. The default choice, and what the tests run on.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<(Partition, String), (Value, u64)>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn fetch(
        &self,
        partition: Partition,
        key: &str,
    ) -> Result<Versioned<Option<Value>>, StoreError> {
        let entries = self.entries.read().unwrap();
        Ok(match entries.get(&(partition, key.to_string())) {
            Some((value, version)) => Versioned {
                value: Some(value.clone()),
                version: *version,
            },
            None => Versioned {
                value: None,
                version: 0,
            },
        })
    }

    async fn store(
        &self,
        partition: Partition,
        key: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.write().unwrap();
        let slot = entries
            .entry((partition, key.to_string()))
            .or_insert((Value::Null, 0));
        slot.0 = value;
        slot.1 += 1;
        Ok(())
    }

    async fn store_if(
        &self,
        partition: Partition,
        key: &str,
        value: Value,
        expected: u64,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().unwrap();
        let current = entries
            .get(&(partition, key.to_string()))
            .map(|(_, version)| *version)
            .unwrap_or(0);
        if current != expected {
            return Ok(false);
        }
        entries.insert((partition, key.to_string()), (value, current + 1));
        Ok(true)
    }
}
