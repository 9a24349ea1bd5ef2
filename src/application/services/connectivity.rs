use crate::application::ports::reachability::ReachabilityProbe;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    Online,
    Offline,
}

/// Raw hint from the platform. Never trusted on its own for going online.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformSignal {
    Online,
    Offline,
}

/// Tracks whether the backend is reachable.
///
/// Offline signals apply immediately. Online signals only take effect after a
/// reachability probe succeeds, and a probe result is dropped if an offline
/// signal arrived while it was in flight.
pub struct ConnectivityMonitor {
    probe: Arc<dyn ReachabilityProbe>,
    probe_timeout: Duration,
    state_tx: watch::Sender<ConnectivityState>,
    offline_epoch: AtomicU64,
    probe_gate: Mutex<()>,
}

impl ConnectivityMonitor {
    /// Starts offline until a probe proves otherwise.
    pub fn new(probe: Arc<dyn ReachabilityProbe>, probe_timeout: Duration) -> Self {
        let (state_tx, _) = watch::channel(ConnectivityState::Offline);
        Self {
            probe,
            probe_timeout,
            state_tx,
            offline_epoch: AtomicU64::new(0),
            probe_gate: Mutex::new(()),
        }
    }

    pub fn current(&self) -> ConnectivityState {
        *self.state_tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current() == ConnectivityState::Online
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state_tx.subscribe()
    }

    pub async fn report_platform_signal(&self, signal: PlatformSignal) -> ConnectivityState {
        match signal {
            PlatformSignal::Offline => {
                self.offline_epoch.fetch_add(1, Ordering::SeqCst);
                self.set(ConnectivityState::Offline, "platform signal");
                ConnectivityState::Offline
            }
            PlatformSignal::Online => {
                if self.is_online() {
                    return ConnectivityState::Online;
                }
                self.verify().await
            }
        }
    }

    /// Probes the backend and updates the state either way. Used by the
    /// periodic poll and by the CLI before a one-shot drain.
    pub async fn refresh(&self) -> ConnectivityState {
        let epoch = self.offline_epoch.load(Ordering::SeqCst);
        let reachable = self.run_probe().await;
        if reachable {
            self.promote_if_current(epoch);
        } else {
            self.offline_epoch.fetch_add(1, Ordering::SeqCst);
            self.set(ConnectivityState::Offline, "probe failed");
        }
        self.current()
    }

    async fn verify(&self) -> ConnectivityState {
        // 同時に来たオンライン通知は一回のプローブにまとめる
        let _gate = match self.probe_gate.try_lock() {
            Ok(gate) => gate,
            Err(_) => {
                tracing::debug!(target: "sync::connectivity", "probe already in flight");
                return self.current();
            }
        };

        let epoch = self.offline_epoch.load(Ordering::SeqCst);
        if self.run_probe().await {
            self.promote_if_current(epoch);
        } else {
            tracing::debug!(target: "sync::connectivity", "online signal not confirmed by probe");
        }
        self.current()
    }

    async fn run_probe(&self) -> bool {
        match tokio::time::timeout(self.probe_timeout, self.probe.probe()).await {
            Ok(reachable) => reachable,
            Err(_) => {
                tracing::debug!(target: "sync::connectivity", timeout_ms = self.probe_timeout.as_millis() as u64, "probe timed out");
                false
            }
        }
    }

    fn promote_if_current(&self, epoch: u64) {
        if self.offline_epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!(target: "sync::connectivity", "discarding stale probe result");
            return;
        }
        self.set(ConnectivityState::Online, "probe succeeded");
    }

    fn set(&self, next: ConnectivityState, cause: &'static str) {
        let changed = self.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            tracing::info!(target: "sync::connectivity", state = ?next, cause, "connectivity changed");
        }
    }

    /// Re-probes on a fixed interval until `cancel` fires.
    pub fn spawn_polling(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        monitor.refresh().await;
                    }
                }
            }
            tracing::debug!(target: "sync::connectivity", "connectivity polling stopped");
        })
    }
}
