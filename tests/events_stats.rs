use serde_json::{json, Value};
use sitegate::engine::PermissionEngine;
use sitegate::error::StoreError;
use sitegate::events::{EngineEvent, EventBus, StatsRecorder};
use sitegate::store::{
    AllowanceRepository, BlockListRepository, MemoryBackend, Partition, StatsRepository,
    StorageBackend, Versioned,
};
use std::sync::Arc;
use std::time::Duration;

async fn engine_with_bus() -> (Arc<EventBus>, PermissionEngine, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    backend
        .store(Partition::Synced, "blockedDomains", json!(["news.example"]))
        .await
        .unwrap();
    let events = Arc::new(EventBus::new());
    let engine = PermissionEngine::new(
        BlockListRepository::new(backend.clone()),
        AllowanceRepository::new(backend.clone()),
        events.clone(),
    );
    (events, engine, backend)
}

#[tokio::test]
async fn test_grant_emits_site_allowed_after_the_write() {
    let (events, engine, _) = engine_with_bus().await;
    let mut rx = events.subscribe();

    engine.grant("news.example", 5, 1_000).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("event should arrive")
        .expect("bus should stay open");
    assert_eq!(
        event,
        EngineEvent::SiteAllowed {
            domain: "news.example".into(),
            duration_ms: 300_000,
        }
    );
}

#[tokio::test]
async fn test_blocked_hit_emits_site_blocked() {
    let (events, engine, _) = engine_with_bus().await;
    let mut rx = events.subscribe();

    engine.record_blocked_hit("News.Example");

    assert_eq!(
        rx.try_recv().unwrap(),
        EngineEvent::SiteBlocked {
            domain: "news.example".into(),
        }
    );
}

#[tokio::test]
async fn test_recorder_applies_events_to_the_counters() {
    let (events, engine, backend) = engine_with_bus().await;
    let stats = StatsRepository::new(backend.clone());
    let _recorder = StatsRecorder::spawn(stats.clone(), events.subscribe());

    engine.record_blocked_hit("news.example");
    engine.record_blocked_hit("news.example");
    engine.grant("news.example", 5, 1_000).await.unwrap();

    // The recorder runs on its own task; give it a bounded moment
    let mut recorded = None;
    for _ in 0..20 {
        if let Some(stats) = stats.for_domain("news.example").await.unwrap() {
            if stats.blocked_count == 2 && stats.allowed_count == 1 {
                recorded = Some(stats);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let recorded = recorded.expect("recorder should apply both hits and the grant");
    assert_eq!(recorded.total_allowed_ms, 300_000);
    assert!(recorded.last_blocked_ms.is_some());
}

/// A backend that refuses every write to the stats key.
struct StatsDownBackend {
    inner: MemoryBackend,
}

#[async_trait::async_trait]
impl StorageBackend for StatsDownBackend {
    async fn fetch(
        &self,
        partition: Partition,
        key: &str,
    ) -> Result<Versioned<Option<Value>>, StoreError> {
        self.inner.fetch(partition, key).await
    }

    async fn store(&self, partition: Partition, key: &str, value: Value) -> Result<(), StoreError> {
        if key == "blockStats" {
            return Err(StoreError::Unavailable("stats partition down".into()));
        }
        self.inner.store(partition, key, value).await
    }

    async fn store_if(
        &self,
        partition: Partition,
        key: &str,
        value: Value,
        expected: u64,
    ) -> Result<bool, StoreError> {
        if key == "blockStats" {
            return Err(StoreError::Unavailable("stats partition down".into()));
        }
        self.inner.store_if(partition, key, value, expected).await
    }
}

#[tokio::test]
async fn test_stats_failure_does_not_fail_the_grant() {
    let backend = Arc::new(StatsDownBackend {
        inner: MemoryBackend::new(),
    });
    backend
        .store(Partition::Synced, "blockedDomains", json!(["news.example"]))
        .await
        .unwrap();

    let events = Arc::new(EventBus::new());
    let engine = PermissionEngine::new(
        BlockListRepository::new(backend.clone()),
        AllowanceRepository::new(backend.clone()),
        events.clone(),
    );
    let _recorder = StatsRecorder::spawn(StatsRepository::new(backend.clone()), events.subscribe());

    // The grant itself must go through even though the counters cannot
    let grant = engine.grant("news.example", 15, 2_000).await.unwrap();
    assert_eq!(grant.expires_at_ms, 902_000);

    assert!(matches!(
        engine.evaluate("news.example", 3_000).await,
        sitegate::engine::Access::Allowed { .. }
    ));

    // The recorder keeps running after the failed write
    engine.record_blocked_hit("news.example");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(StatsRepository::new(backend.clone())
        .for_domain("news.example")
        .await
        .unwrap()
        .is_none());
}
