//! Wiring: repositories, engine, and background tasks assembled from a
//! `Config`.

use crate::config::Config;
use crate::engine::PermissionEngine;
use crate::error::{ListError, StoreError};
use crate::events::{EventBus, StatsRecorder};
use crate::store::{
    AllowanceRepository, BlockListRepository, MemoryBackend, Partition, SqliteBackend,
    StatsRepository, StorageBackend, KEY_ALLOWED_UNTIL, KEY_BLOCKED_DOMAINS, KEY_BLOCK_STATS,
};
use crate::sweeper::ExpirySweeper;
use crate::watcher::{BadgeFeed, BadgeTicker, PageWatch, PageWatcher};
use crate::TaskHandle;
use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// Sets up the tracing subscriber with the configured filter. Env filter
/// settings take precedence when present.
pub fn setup_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

/// Outcome of a block-this-site request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    Added { domain: String },
    AlreadyListed { domain: String },
}

/// The wired-up engine plus its background work. Dropping it stops the
/// sweeper and the stats recorder.
pub struct Runtime {
    engine: Arc<PermissionEngine>,
    blocklist: BlockListRepository,
    allowances: AllowanceRepository,
    stats: StatsRepository,
    events: Arc<EventBus>,
    watcher: PageWatcher,
    badges: BadgeTicker,
    sweep_trigger: mpsc::Sender<()>,
    _sweeper: TaskHandle,
    _recorder: TaskHandle,
}

impl Runtime {
    /// Builds everything on the backend named in the config.
    pub async fn start(config: Config) -> Result<Self> {
        let backend: Arc<dyn StorageBackend> = match config.storage.backend.as_str() {
            "memory" => Arc::new(MemoryBackend::new()),
            "sqlite" => Arc::new(
                SqliteBackend::open(&config.storage.sqlite_path)
                    .context("Failed to open sqlite store")?,
            ),
            other => bail!("unknown storage backend {:?}", other),
        };
        info!("using {} storage backend", config.storage.backend);
        Self::start_with_backend(config, backend).await
    }

    /// Same as `start`, but on a caller-supplied backend.
    pub async fn start_with_backend(
        config: Config,
        backend: Arc<dyn StorageBackend>,
    ) -> Result<Self> {
        bootstrap_defaults(backend.as_ref())
            .await
            .context("Failed to seed storage defaults")?;

        let blocklist = BlockListRepository::new(backend.clone());
        let allowances = AllowanceRepository::new(backend.clone());
        let stats = StatsRepository::new(backend.clone());
        let events = Arc::new(EventBus::new());

        let engine = Arc::new(PermissionEngine::new(
            blocklist.clone(),
            allowances.clone(),
            events.clone(),
        ));
        let recorder = StatsRecorder::spawn(stats.clone(), events.subscribe());

        let sweeper = ExpirySweeper::new(allowances.clone());
        let (sweeper_task, sweep_trigger) =
            sweeper.spawn(Duration::from_secs(config.sweep.interval_secs));

        let watcher = PageWatcher::new(engine.clone(), &config.watch);
        let badges = BadgeTicker::new(engine.clone(), &config.watch);

        info!("permission runtime started");
        Ok(Self {
            engine,
            blocklist,
            allowances,
            stats,
            events,
            watcher,
            badges,
            sweep_trigger,
            _sweeper: sweeper_task,
            _recorder: recorder,
        })
    }

    pub fn engine(&self) -> Arc<PermissionEngine> {
        self.engine.clone()
    }

    pub fn blocklist(&self) -> &BlockListRepository {
        &self.blocklist
    }

    pub fn allowances(&self) -> &AllowanceRepository {
        &self.allowances
    }

    pub fn stats(&self) -> &StatsRepository {
        &self.stats
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Starts the re-check loop for the page at `url`.
    pub fn watch_page(&self, url: &str) -> PageWatch {
        self.watcher.watch_url(url)
    }

    /// Starts a countdown badge feed for `host`.
    pub fn badge_feed(&self, host: &str) -> BadgeFeed {
        self.badges.feed(host)
    }

    /// Runs a sweep pass now instead of waiting for the interval. A trigger
    /// already in flight means a pass is imminent, so this never queues more
    /// than one.
    pub fn force_sweep(&self) {
        let _ = self.sweep_trigger.try_send(());
    }

    /// Adds the host behind `page_url` to the block list.
    pub async fn block_site(&self, page_url: &str) -> Result<BlockOutcome, ListError> {
        let host = crate::domain::host_from_url(page_url)
            .ok_or_else(|| ListError::InvalidDomain(page_url.to_string()))?;

        if self.blocklist.add(&host).await? {
            info!("added {} to the block list", host);
            Ok(BlockOutcome::Added { domain: host })
        } else {
            Ok(BlockOutcome::AlreadyListed { domain: host })
        }
    }
}

/// First-run seeding: every key exists with its default shape afterwards, so
/// collaborators can rely on well-formed reads.
async fn bootstrap_defaults(backend: &dyn StorageBackend) -> Result<(), StoreError> {
    let defaults = [
        (Partition::Synced, KEY_BLOCKED_DOMAINS, Value::Array(Vec::new())),
        (Partition::Local, KEY_ALLOWED_UNTIL, Value::Object(Map::new())),
        (Partition::Local, KEY_BLOCK_STATS, Value::Object(Map::new())),
    ];

    for (partition, key, default) in defaults {
        let fetched = backend.fetch(partition, key).await?;
        if fetched.value.is_none() {
            // Conditional on the version so a racing writer's data wins
            backend.store_if(partition, key, default, fetched.version).await?;
        }
    }
    Ok(())
}
