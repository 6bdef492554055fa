use crate::store::StatsRepository;
use crate::TaskHandle;
use std::sync::RwLock;
use tokio::sync::mpsc;
use tracing::warn;

/// Notifications emitted by the permission engine for observational
/// consumers (stats, notification surfaces).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    SiteBlocked { domain: String },
    SiteAllowed { domain: String, duration_ms: u64 },
}

/// Fan-out bus. Emission never blocks and never fails: a subscriber that
/// stops draining loses events rather than stalling the engine.
#[derive(Default)]
pub struct EventBus {
    sinks: RwLock<Vec<mpsc::Sender<EngineEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<EngineEvent> {
        let (tx, rx) = mpsc::channel(256);
        self.sinks.write().unwrap().push(tx);
        rx
    }

    pub fn emit(&self, event: EngineEvent) {
        let sinks = self.sinks.read().unwrap();
        for sink in sinks.iter() {
            // Fire and forget, don't block the emitter if a buffer is full
            let _ = sink.try_send(event.clone());
        }
    }
}

/// Applies engine events to the stats counters. Failures are logged and
/// dropped so stats can never hold up a grant or a blocking decision.
pub struct StatsRecorder;

impl StatsRecorder {
    pub fn spawn(stats: StatsRepository, mut rx: mpsc::Receiver<EngineEvent>) -> TaskHandle {
        TaskHandle::new(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let outcome = match &event {
                    EngineEvent::SiteBlocked { domain } => {
                        stats.record_blocked(domain, crate::now_ms()).await
                    }
                    EngineEvent::SiteAllowed { domain, duration_ms } => {
                        stats.record_allowed(domain, *duration_ms).await
                    }
                };
                if let Err(e) = outcome {
                    warn!("failed to record stats for {:?}: {}", event, e);
                }
            }
        }))
    }
}
