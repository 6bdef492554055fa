use serde_json::{json, Map, Value};
use sitegate::error::StoreError;
use sitegate::store::{AllowanceRepository, MemoryBackend, Partition, StorageBackend, Versioned};
use sitegate::sweeper::ExpirySweeper;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn sweeper_on(backend: Arc<dyn StorageBackend>) -> (AllowanceRepository, ExpirySweeper) {
    let allowances = AllowanceRepository::new(backend);
    (allowances.clone(), ExpirySweeper::new(allowances))
}

async fn seed_allowances(backend: &dyn StorageBackend, entries: &[(&str, u64)]) {
    let map: HashMap<&str, u64> = entries.iter().copied().collect();
    backend
        .store(Partition::Local, "allowedUntil", json!(map))
        .await
        .unwrap();
}

async fn allowance_version(backend: &dyn StorageBackend) -> u64 {
    backend
        .fetch(Partition::Local, "allowedUntil")
        .await
        .unwrap()
        .version
}

#[tokio::test]
async fn test_sweep_removes_exactly_the_expired_entries() {
    let backend = Arc::new(MemoryBackend::new());
    seed_allowances(
        backend.as_ref(),
        &[("a.example", 1_000), ("b.example", 2_000), ("c.example", 3_000)],
    )
    .await;
    let (allowances, sweeper) = sweeper_on(backend);

    // Expiry at exactly now counts as expired
    let outcome = sweeper.sweep(2_000).await.unwrap();
    assert_eq!(outcome.removed, 2);
    assert_eq!(outcome.retained, 1);

    let survivors = allowances.snapshot().await.unwrap().value;
    assert_eq!(survivors.len(), 1);
    assert_eq!(survivors.get("c.example"), Some(&3_000));
}

#[tokio::test]
async fn test_sweep_is_idempotent_and_skips_redundant_writes() {
    let backend = Arc::new(MemoryBackend::new());
    seed_allowances(backend.as_ref(), &[("a.example", 1_000), ("c.example", 3_000)]).await;
    let (_, sweeper) = sweeper_on(backend.clone());

    let first = sweeper.sweep(2_000).await.unwrap();
    assert_eq!(first.removed, 1);
    let version_after_first = allowance_version(backend.as_ref()).await;

    // Nothing left to remove: no write, version untouched
    let second = sweeper.sweep(2_000).await.unwrap();
    assert_eq!(second.removed, 0);
    assert_eq!(second.retained, 1);
    assert_eq!(allowance_version(backend.as_ref()).await, version_after_first);
}

#[tokio::test]
async fn test_sweep_with_nothing_expired_writes_nothing() {
    let backend = Arc::new(MemoryBackend::new());
    seed_allowances(backend.as_ref(), &[("a.example", 9_000)]).await;
    let (_, sweeper) = sweeper_on(backend.clone());

    let before = allowance_version(backend.as_ref()).await;
    let outcome = sweeper.sweep(2_000).await.unwrap();
    assert_eq!(outcome.removed, 0);
    assert_eq!(allowance_version(backend.as_ref()).await, before);
}

/// Injects a racing grant between the sweeper's read and its writeback,
/// exactly once.
struct RacingBackend {
    inner: MemoryBackend,
    armed: AtomicBool,
}

impl RacingBackend {
    fn new() -> Self {
        Self {
            inner: MemoryBackend::new(),
            armed: AtomicBool::new(false),
        }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl StorageBackend for RacingBackend {
    async fn fetch(
        &self,
        partition: Partition,
        key: &str,
    ) -> Result<Versioned<Option<Value>>, StoreError> {
        self.inner.fetch(partition, key).await
    }

    async fn store(&self, partition: Partition, key: &str, value: Value) -> Result<(), StoreError> {
        self.inner.store(partition, key, value).await
    }

    async fn store_if(
        &self,
        partition: Partition,
        key: &str,
        value: Value,
        expected: u64,
    ) -> Result<bool, StoreError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            // A grant lands after the caller read the map
            let fetched = self.inner.fetch(partition, key).await?;
            let mut map = match fetched.value {
                Some(Value::Object(map)) => map,
                _ => Map::new(),
            };
            map.insert("racer.example".to_string(), json!(9_999_999));
            self.inner.store(partition, key, Value::Object(map)).await?;
        }
        self.inner.store_if(partition, key, value, expected).await
    }
}

#[tokio::test]
async fn test_grant_landing_mid_sweep_survives() {
    let backend = Arc::new(RacingBackend::new());
    seed_allowances(backend.as_ref(), &[("old.example", 1_000)]).await;
    let (allowances, sweeper) = sweeper_on(backend.clone());

    backend.arm();
    let outcome = sweeper.sweep(5_000).await.unwrap();
    assert_eq!(outcome.removed, 1);

    // The racing grant is intact; only the expired entry is gone
    let survivors = allowances.snapshot().await.unwrap().value;
    assert_eq!(survivors.len(), 1);
    assert_eq!(survivors.get("racer.example"), Some(&9_999_999));
}

#[tokio::test]
async fn test_spawned_loop_sweeps_and_honors_the_trigger() {
    let backend = Arc::new(MemoryBackend::new());
    let now = sitegate::now_ms();
    seed_allowances(backend.as_ref(), &[("expired.example", now - 1_000)]).await;
    let (allowances, sweeper) = sweeper_on(backend.clone());

    // Short interval so the first pass lands quickly
    let (handle, trigger) = sweeper.spawn(Duration::from_millis(50));

    let mut cleaned = false;
    for _ in 0..20 {
        if allowances.snapshot().await.unwrap().value.is_empty() {
            cleaned = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(cleaned, "periodic sweep should clear the expired entry");

    // Trigger a forced pass for a freshly expired entry
    allowances.put("late.example", sitegate::now_ms() - 1).await.unwrap();
    trigger.send(()).await.unwrap();

    let mut cleaned = false;
    for _ in 0..20 {
        if allowances.snapshot().await.unwrap().value.is_empty() {
            cleaned = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(cleaned, "forced sweep should clear the expired entry");

    drop(handle);
}
