//! Periodic re-advertisement of local publishers.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::announcer::Announcer;

/// Background task that re-sends every local ADV once per period, so
/// nodes that missed an announcement, or started later, still discover
/// our publishers.
pub struct Repeater {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Repeater {
    /// Start repeating. The first repeat happens one `period` from now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(period: Duration, announcer: Announcer) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        debug!("repeating advertisements");
                        announcer.advertise_all();
                    }
                }
            }
            debug!("repeater stopped");
        });

        info!(period_ms = period.as_millis(), "repeater started");
        Self {
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Stop the task and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Repeater {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
