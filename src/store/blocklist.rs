use super::{Partition, StorageBackend, KEY_BLOCKED_DOMAINS};
use crate::domain;
use crate::error::{ListError, StoreError};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const CAS_ATTEMPTS: usize = 4;

/// Typed access to the synced block list.
#[derive(Clone)]
pub struct BlockListRepository {
    backend: Arc<dyn StorageBackend>,
}

impl BlockListRepository {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Current list entries. Anything that is not an array of strings decodes
    /// as an empty list rather than an error.
    pub async fn all(&self) -> Result<Vec<String>, StoreError> {
        let fetched = self.backend.fetch(Partition::Synced, KEY_BLOCKED_DOMAINS).await?;
        Ok(decode_list(fetched.value))
    }

    /// Adds a domain to the list. Returns false when it was already there.
    pub async fn add(&self, raw: &str) -> Result<bool, ListError> {
        let host = domain::normalize(raw)
            .filter(|h| domain::validate(h))
            .ok_or_else(|| ListError::InvalidDomain(raw.to_string()))?;

        for _ in 0..CAS_ATTEMPTS {
            let fetched = self.backend.fetch(Partition::Synced, KEY_BLOCKED_DOMAINS).await?;
            let version = fetched.version;
            let mut entries = decode_list(fetched.value);

            if entries.iter().any(|e| e == &host) {
                return Ok(false);
            }
            entries.push(host.clone());

            if self
                .backend
                .store_if(Partition::Synced, KEY_BLOCKED_DOMAINS, Value::from(entries), version)
                .await?
            {
                debug!("block list gained {}", host);
                return Ok(true);
            }
        }
        Err(ListError::Store(StoreError::Conflict))
    }

    /// Removes an exact entry (suffix matches stay). Returns false when the
    /// entry was not listed.
    pub async fn remove(&self, raw: &str) -> Result<bool, ListError> {
        let host = match domain::normalize(raw) {
            Some(host) => host,
            None => return Ok(false),
        };

        for _ in 0..CAS_ATTEMPTS {
            let fetched = self.backend.fetch(Partition::Synced, KEY_BLOCKED_DOMAINS).await?;
            let version = fetched.version;
            let mut entries = decode_list(fetched.value);

            let before = entries.len();
            entries.retain(|e| e != &host);
            if entries.len() == before {
                return Ok(false);
            }

            if self
                .backend
                .store_if(Partition::Synced, KEY_BLOCKED_DOMAINS, Value::from(entries), version)
                .await?
            {
                debug!("block list dropped {}", host);
                return Ok(true);
            }
        }
        Err(ListError::Store(StoreError::Conflict))
    }
}

fn decode_list(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
