//! The permission engine: decides access for a (domain, instant) pair and
//! persists timed allowances.

pub mod matcher;

pub use self::matcher::DomainSet;

use crate::domain;
use crate::error::GrantError;
use crate::events::{EngineEvent, EventBus};
use crate::store::{AllowanceRepository, BlockListRepository};
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of evaluating one (domain, instant) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Not on the block list; allowances are irrelevant.
    Unblocked,
    /// Listed, with no live allowance.
    Blocked,
    /// Listed, with a live allowance.
    Allowed { remaining_ms: u64 },
}

/// A successfully persisted allowance, returned so the caller can render the
/// countdown without a second store read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub domain: String,
    pub expires_at_ms: u64,
    pub duration_ms: u64,
}

pub struct PermissionEngine {
    blocklist: BlockListRepository,
    allowances: AllowanceRepository,
    events: Arc<EventBus>,
    // Last successfully loaded list, used when the store cannot be read
    last_known: ArcSwapOption<DomainSet>,
}

impl PermissionEngine {
    pub fn new(
        blocklist: BlockListRepository,
        allowances: AllowanceRepository,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            blocklist,
            allowances,
            events,
            last_known: ArcSwapOption::empty(),
        }
    }

    /// Decides access for `host` at `now_ms`.
    ///
    /// Never fails: storage trouble degrades toward blocking for listed (or
    /// unknowable) domains, while input that cannot name a host is treated as
    /// out of scope rather than blocked.
    pub async fn evaluate(&self, host: &str, now_ms: u64) -> Access {
        let host = match domain::normalize(host) {
            Some(host) => host,
            None => {
                warn!("unusable domain {:?}, skipping evaluation", host);
                return Access::Unblocked;
            }
        };

        let listed = match self.load_list().await {
            Some(set) => set.matches(&host),
            // No list and no fallback copy: refuse rather than wave through
            None => true,
        };
        if !listed {
            return Access::Unblocked;
        }

        // Allowances are keyed by the exact host; they do not cascade to
        // subdomains the way list entries do
        match self.allowances.expiry_for(&host).await {
            Ok(Some(expiry)) if expiry > now_ms => Access::Allowed {
                remaining_ms: expiry - now_ms,
            },
            Ok(_) => Access::Blocked,
            Err(e) => {
                warn!("allowance read failed for {}: {} (keeping blocked)", host, e);
                Access::Blocked
            }
        }
    }

    /// Persists a timed allowance for `host`, replacing any existing one.
    /// The `SiteAllowed` event goes out only after the write has committed.
    pub async fn grant(&self, host: &str, minutes: u32, now_ms: u64) -> Result<Grant, GrantError> {
        let host =
            domain::normalize(host).ok_or_else(|| GrantError::InvalidDomain(host.to_string()))?;
        if minutes == 0 {
            return Err(GrantError::InvalidDuration);
        }

        let duration_ms = u64::from(minutes) * 60_000;
        let expires_at_ms = now_ms + duration_ms;
        self.allowances.put(&host, expires_at_ms).await?;

        self.events.emit(EngineEvent::SiteAllowed {
            domain: host.clone(),
            duration_ms,
        });
        debug!("granted {} access for {}m (until {})", host, minutes, expires_at_ms);

        Ok(Grant {
            domain: host,
            expires_at_ms,
            duration_ms,
        })
    }

    /// Reports that a blocking surface intercepted a visit. Non-blocking and
    /// infallible; the counters are applied by the stats consumer.
    pub fn record_blocked_hit(&self, host: &str) {
        let domain = match domain::normalize(host) {
            Some(host) => host,
            None => return,
        };
        self.events.emit(EngineEvent::SiteBlocked { domain });
    }

    async fn load_list(&self) -> Option<Arc<DomainSet>> {
        match self.blocklist.all().await {
            Ok(entries) => {
                let set = Arc::new(DomainSet::from_entries(entries));
                self.last_known.store(Some(set.clone()));
                Some(set)
            }
            Err(e) => match self.last_known.load_full() {
                Some(set) => {
                    warn!("block list read failed: {} (using last known copy)", e);
                    Some(set)
                }
                None => {
                    warn!("block list read failed with no known copy: {}", e);
                    None
                }
            },
        }
    }
}
