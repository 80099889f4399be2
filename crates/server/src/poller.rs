//! Background loop that drives the message pipeline: one poll cycle per
//! tick, stopped through a watch channel so an in-flight cycle can finish.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::pipeline::Pipeline;

pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Signal the loop and wait for it to wind down.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(error) = self.task.await {
            warn!(
                event_name = "poller.stop.join_failed",
                error = %error,
                "poller task did not shut down cleanly"
            );
        }
    }
}

pub fn spawn(pipeline: Arc<Pipeline>, poll_interval: Duration) -> PollerHandle {
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            event_name = "poller.started",
            interval_secs = poll_interval.as_secs(),
            "message poller started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!(event_name = "poller.stopped", "message poller stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(error) = pipeline.run_cycle().await {
                        warn!(
                            event_name = "poller.cycle.failed",
                            error = %error,
                            "poll cycle failed; next tick will retry"
                        );
                    }
                }
            }
        }
    });

    PollerHandle { shutdown, task }
}
