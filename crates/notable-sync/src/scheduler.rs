//! Background sync scheduler
//!
//! The [`SyncScheduler`] drives the [`SyncOrchestrator`] from a single
//! `tokio::select!` loop:
//!
//! ```text
//! sync interval ──→ sync_bidirectional
//! probe interval ─→ test_connection ──(offline → online)──→ wait, process_queue
//!                └→ sync_requested flag ──→ sync_bidirectional
//! CancellationToken ──→ exit
//! ```
//!
//! Every orchestrator call is raced against the token, so a shutdown
//! abandons a cycle that is waiting on the network instead of waiting for
//! its requests to time out.
//!
//! [`request_sync()`](SyncScheduler::request_sync) lets a CLI or UI ask for
//! a cycle without waiting for the next interval; the request is picked up
//! on the next probe tick.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::orchestrator::SyncOrchestrator;

/// Default time between connectivity probes
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Pause after the network comes back before the queue is drained
pub const RECONNECT_SETTLE_DELAY: Duration = Duration::from_secs(2);

pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    sync_interval: Duration,
    probe_interval: Duration,
    reconnect_delay: Duration,
    /// Set when a cycle should run at the next probe tick
    sync_requested: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl SyncScheduler {
    /// Creates a scheduler bound to the orchestrator's cancellation token
    ///
    /// Returns the scheduler and the shared request flag. Storing `true` in
    /// the flag has the same effect as [`request_sync`](Self::request_sync).
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        sync_interval: Duration,
        probe_interval: Duration,
    ) -> (Self, Arc<AtomicBool>) {
        let sync_requested = Arc::new(AtomicBool::new(false));
        let flag = sync_requested.clone();

        info!(
            sync_secs = sync_interval.as_secs(),
            probe_secs = probe_interval.as_secs(),
            "Creating sync scheduler"
        );

        let scheduler = Self {
            cancel: orchestrator.cancellation_token(),
            orchestrator,
            sync_interval,
            probe_interval,
            reconnect_delay: RECONNECT_SETTLE_DELAY,
            sync_requested,
        };
        (scheduler, flag)
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn request_sync(&self) {
        info!("Immediate sync requested");
        self.sync_requested.store(true, Ordering::Release);
    }

    pub fn is_sync_requested(&self) -> bool {
        self.sync_requested.load(Ordering::Acquire)
    }

    /// Consume a pending request, returning whether there was one
    fn take_sync_request(&self) -> bool {
        self.sync_requested.swap(false, Ordering::AcqRel)
    }

    /// Main loop; returns once the cancellation token fires
    ///
    /// The first sync tick fires immediately, so a cycle runs at startup.
    /// The device is assumed offline until the first probe succeeds, which
    /// makes that probe drain anything queued by an earlier run.
    pub async fn run(&self) {
        info!("Sync scheduler starting");

        let mut sync_timer = tokio::time::interval(self.sync_interval);
        sync_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut probe_timer = tokio::time::interval(self.probe_interval);
        probe_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut online = false;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,

                _ = sync_timer.tick() => {
                    if !self.run_cycle("interval").await {
                        break;
                    }
                }

                _ = probe_timer.tick() => {
                    let reachable = tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        reachable = self.orchestrator.test_connection() => reachable,
                    };
                    if reachable && !online {
                        info!("Server reachable again");
                        if !self.on_reconnect().await {
                            break;
                        }
                    } else if !reachable && online {
                        warn!("Server unreachable; queued work waits for the network");
                    }
                    online = reachable;

                    if self.take_sync_request() && !self.run_cycle("request").await {
                        break;
                    }
                }
            }
        }

        info!("Sync scheduler stopped");
    }

    /// One bidirectional cycle; false when it was abandoned for shutdown
    async fn run_cycle(&self, trigger: &str) -> bool {
        debug!(trigger, "Sync cycle starting");
        tokio::select! {
            _ = self.cancel.cancelled() => {
                info!(trigger, "Sync cycle abandoned for shutdown");
                false
            }
            outcome = self.orchestrator.sync_bidirectional() => {
                info!(trigger, %outcome, "Sync cycle finished");
                true
            }
        }
    }

    /// Drain the queue after the network returns; false when cancelled
    async fn on_reconnect(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => return false,
            _ = tokio::time::sleep(self.reconnect_delay) => {}
        }
        match self.orchestrator.queue_status().await {
            Ok(status) if status.has_pending_items() => {
                info!(pending = status.pending, "Replaying queued operations");
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        info!("Queue replay abandoned for shutdown");
                        return false;
                    }
                    outcome = self.orchestrator.process_queue() => {
                        info!(%outcome, "Queue replay finished");
                    }
                }
            }
            Ok(_) => debug!("Nothing queued"),
            Err(e) => warn!(error = %e, "Could not read queue status"),
        }
        true
    }
}
