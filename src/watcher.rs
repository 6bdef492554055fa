//! Per-page re-check scheduling and the countdown badge feed.

use crate::badge::{classify, CountdownBadge};
use crate::config::WatchConfig;
use crate::engine::{Access, PermissionEngine};
use crate::TaskHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::warn;

/// Delay before the next allowance re-check: the regular poll, or just past
/// expiry when that comes sooner.
pub fn next_check_delay_ms(remaining_ms: u64, poll_ms: u64, slack_ms: u64) -> u64 {
    poll_ms.min(remaining_ms.saturating_add(slack_ms))
}

/// Live access state for one page context. Dropping it cancels the
/// background re-check task.
pub struct PageWatch {
    updates: watch::Receiver<Option<Access>>,
    task: TaskHandle,
}

impl PageWatch {
    /// A receiver of decision changes; clone freely.
    pub fn updates(&self) -> watch::Receiver<Option<Access>> {
        self.updates.clone()
    }

    /// Most recent decision, `None` until the first check lands.
    pub fn current(&self) -> Option<Access> {
        *self.updates.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Starts the re-check loop for individual pages.
pub struct PageWatcher {
    engine: Arc<PermissionEngine>,
    poll_ms: u64,
    slack_ms: u64,
}

impl PageWatcher {
    pub fn new(engine: Arc<PermissionEngine>, config: &WatchConfig) -> Self {
        Self {
            engine,
            poll_ms: config.poll_secs * 1000,
            slack_ms: config.expiry_slack_ms,
        }
    }

    /// Watches the page at `url`. The first decision is published shortly
    /// after; later transitions follow the re-check schedule.
    pub fn watch_url(&self, url: &str) -> PageWatch {
        let engine = self.engine.clone();
        let url = url.to_string();
        let poll_ms = self.poll_ms;
        let slack_ms = self.slack_ms;
        let (tx, rx) = watch::channel(None);

        let task = tokio::spawn(async move {
            let host = match crate::domain::host_from_url(&url) {
                Some(host) => host,
                None => {
                    warn!("no usable host in {:?}, leaving page unblocked", url);
                    let _ = tx.send(Some(Access::Unblocked));
                    return;
                }
            };
            run_watch(engine, host, poll_ms, slack_ms, tx).await;
        });

        PageWatch {
            updates: rx,
            task: TaskHandle::new(task),
        }
    }
}

/// The watch loop. Gate checks count a blocked hit every time the domain is
/// list-matched; the cheaper allowance polls in between do not.
async fn run_watch(
    engine: Arc<PermissionEngine>,
    host: String,
    poll_ms: u64,
    slack_ms: u64,
    tx: watch::Sender<Option<Access>>,
) {
    loop {
        // Gate check
        let state = engine.evaluate(&host, crate::now_ms()).await;
        if state != Access::Unblocked {
            engine.record_blocked_hit(&host);
        }
        if tx.send(Some(state)).is_err() {
            return;
        }

        match state {
            // Unlisted pages need no further watching
            Access::Unblocked => return,
            Access::Blocked => {
                tokio::time::sleep(Duration::from_millis(poll_ms)).await;
            }
            Access::Allowed { remaining_ms } => {
                let mut remaining = remaining_ms;
                loop {
                    let delay = next_check_delay_ms(remaining, poll_ms, slack_ms);
                    tokio::time::sleep(Duration::from_millis(delay)).await;

                    match engine.evaluate(&host, crate::now_ms()).await {
                        Access::Allowed { remaining_ms } => {
                            remaining = remaining_ms;
                            if tx.send(Some(Access::Allowed { remaining_ms })).is_err() {
                                return;
                            }
                        }
                        // Expired, swept, or the list changed: rerun the gate check
                        _ => break,
                    }
                }
            }
        }
    }
}

/// Countdown feed for one page's badge. Dropping it stops the ticker.
pub struct BadgeFeed {
    updates: watch::Receiver<Option<CountdownBadge>>,
    refresh: mpsc::Sender<()>,
    _task: TaskHandle,
}

impl BadgeFeed {
    pub fn updates(&self) -> watch::Receiver<Option<CountdownBadge>> {
        self.updates.clone()
    }

    pub fn current(&self) -> Option<CountdownBadge> {
        (*self.updates.borrow()).clone()
    }

    /// Recompute now instead of waiting for the next tick (focus changes).
    pub fn refresh(&self) {
        let _ = self.refresh.try_send(());
    }
}

/// Produces badge feeds that recompute from a fresh evaluation every tick.
pub struct BadgeTicker {
    engine: Arc<PermissionEngine>,
    tick: Duration,
}

impl BadgeTicker {
    pub fn new(engine: Arc<PermissionEngine>, config: &WatchConfig) -> Self {
        Self {
            engine,
            tick: Duration::from_secs(config.badge_tick_secs),
        }
    }

    pub fn feed(&self, host: &str) -> BadgeFeed {
        let engine = self.engine.clone();
        let host = host.to_string();
        let tick = self.tick;
        let (tx, rx) = watch::channel(None);
        let (refresh_tx, mut refresh_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    msg = refresh_rx.recv() => {
                        match msg {
                            Some(()) => ticker.reset(),
                            None => break,
                        }
                    }
                }

                // Recomputed from storage each tick, never cached
                let badge = match engine.evaluate(&host, crate::now_ms()).await {
                    Access::Allowed { remaining_ms } => classify(remaining_ms),
                    _ => None,
                };
                if tx.send(badge).is_err() {
                    break;
                }
            }
        });

        BadgeFeed {
            updates: rx,
            refresh: refresh_tx,
            _task: TaskHandle::new(task),
        }
    }
}
