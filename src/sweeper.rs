//! Background retirement of expired allowances.

use crate::error::StoreError;
use crate::store::AllowanceRepository;
use crate::TaskHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const SWEEP_CAS_ATTEMPTS: usize = 3;

/// What one sweep pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    pub removed: usize,
    pub retained: usize,
}

/// Removes expired allowances. Safe to run at any time and from anywhere:
/// the writeback is version-checked, so a grant landing mid-sweep survives.
#[derive(Clone)]
pub struct ExpirySweeper {
    allowances: AllowanceRepository,
}

impl ExpirySweeper {
    pub fn new(allowances: AllowanceRepository) -> Self {
        Self { allowances }
    }

    /// One pass: drop every entry with `expiry <= now_ms`, keep the rest
    /// untouched, and write back only when something was dropped.
    pub async fn sweep(&self, now_ms: u64) -> Result<SweepOutcome, StoreError> {
        for _ in 0..SWEEP_CAS_ATTEMPTS {
            let snapshot = self.allowances.snapshot().await?;
            let version = snapshot.version;
            let mut live = snapshot.value;

            let before = live.len();
            live.retain(|_, expiry| *expiry > now_ms);
            let outcome = SweepOutcome {
                removed: before - live.len(),
                retained: live.len(),
            };

            if outcome.removed == 0 {
                return Ok(outcome);
            }
            if self.allowances.replace_if(&live, version).await? {
                return Ok(outcome);
            }
            // A grant (or another sweeper) landed in between; redo on fresh data
            debug!("allowance map changed mid-sweep, retrying");
        }
        Err(StoreError::Conflict)
    }

    /// Spawns the periodic loop. Returns the owning handle plus a trigger for
    /// forcing an immediate pass. The loop stops when the handle is dropped
    /// or every trigger sender is gone.
    pub fn spawn(self, interval: Duration) -> (TaskHandle, mpsc::Sender<()>) {
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    msg = trigger_rx.recv() => {
                        match msg {
                            // Reset so a forced pass isn't followed by a near-immediate scheduled one
                            Some(()) => ticker.reset(),
                            None => break,
                        }
                    }
                }

                match self.sweep(crate::now_ms()).await {
                    Ok(outcome) if outcome.removed > 0 => {
                        info!(
                            "swept {} expired allowance(s), {} remaining",
                            outcome.removed, outcome.retained
                        );
                    }
                    Ok(_) => {}
                    Err(e) => warn!("allowance sweep failed: {}", e),
                }
            }
        });

        (TaskHandle::new(handle), trigger_tx)
    }
}
