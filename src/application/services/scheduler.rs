use super::connectivity::{ConnectivityMonitor, ConnectivityState};
use super::reconciler::Reconciler;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Starts drains when connectivity comes back and on a fixed interval.
pub struct SyncScheduler {
    reconciler: Arc<Reconciler>,
    connectivity: Arc<ConnectivityMonitor>,
    interval: Duration,
}

impl SyncScheduler {
    pub fn new(
        reconciler: Arc<Reconciler>,
        connectivity: Arc<ConnectivityMonitor>,
        interval: Duration,
    ) -> Self {
        Self {
            reconciler,
            connectivity,
            interval,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut changes = self.connectivity.subscribe();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(target: "sync::reconciler", interval_secs = self.interval.as_secs(), "sync scheduler started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *changes.borrow_and_update();
                    if state == ConnectivityState::Online {
                        self.drain_once("connectivity restored").await;
                    }
                }
                _ = ticker.tick() => {
                    if self.connectivity.is_online() {
                        self.drain_once("interval").await;
                    }
                }
            }
        }
        tracing::info!(target: "sync::reconciler", "sync scheduler stopped");
    }

    async fn drain_once(&self, trigger: &'static str) {
        tracing::debug!(target: "sync::reconciler", trigger, "drain triggered");
        if let Err(err) = self.reconciler.drain().await {
            tracing::error!(target: "sync::reconciler", trigger, error = %err, "drain failed");
        }
    }
}
