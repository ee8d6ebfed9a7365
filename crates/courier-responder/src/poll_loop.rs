//! Fixed-interval poll loop.
//!
//! Each tick optionally sweeps expired messages, then runs one responder
//! batch. The batch is awaited inside the loop task, so ticks never overlap;
//! ticks missed while a batch runs are dropped, not queued up. Shutdown is
//! observed between batches, which lets an in-flight batch drain.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{watch, Notify},
    time::MissedTickBehavior,
};
use tracing::{debug, error, info};

use crate::responder::Responder;

/// Handle returned to the caller so it can request an immediate batch or shut
/// the loop down.
pub struct PollLoopHandle {
    /// Wake the loop early (e.g. a push notification arrived).
    pub wake: Arc<Notify>,
    /// Send `true` to shut down after the current batch.
    pub shutdown_tx: watch::Sender<bool>,
}

impl PollLoopHandle {
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Spawn the poll loop as a tokio task.
pub fn spawn_poll_loop(
    responder: Arc<Responder>,
    interval: Duration,
    sweep_expired: bool,
) -> (tokio::task::JoinHandle<()>, PollLoopHandle) {
    let wake = Arc::new(Notify::new());
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let wake_clone = wake.clone();

    let handle = tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "poll loop started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = wake_clone.notified() => {
                    debug!("poll loop woken early");
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }

            if *shutdown_rx.borrow() {
                break;
            }

            if sweep_expired {
                if let Err(e) = responder.sweep().await {
                    error!(error = %e, "expiry sweep failed");
                }
            }

            match responder.run_batch().await {
                Ok(Some(report)) if !report.is_empty() => {
                    debug!(processed = report.outcomes.len(), "tick handled messages");
                }
                Ok(Some(_)) => {}
                Ok(None) => debug!("tick skipped; batch still in flight"),
                Err(e) => error!(error = %e, "batch failed"),
            }
        }

        info!("poll loop shutting down");
    });

    (handle, PollLoopHandle { wake, shutdown_tx })
}
