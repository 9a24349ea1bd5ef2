use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

pub const UNSET_TS: u64 = 0;

#[derive(Debug)]
pub struct AtomicMetric {
    success: AtomicU64,
    failure: AtomicU64,
    last_success_ms: AtomicU64,
    last_failure_ms: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AtomicSnapshot {
    pub successes: u64,
    pub failures: u64,
    pub last_success_ms: Option<u64>,
    pub last_failure_ms: Option<u64>,
}

impl AtomicMetric {
    pub const fn new() -> Self {
        Self {
            success: AtomicU64::new(0),
            failure: AtomicU64::new(0),
            last_success_ms: AtomicU64::new(UNSET_TS),
            last_failure_ms: AtomicU64::new(UNSET_TS),
        }
    }

    pub fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
        self.last_success_ms
            .store(current_unix_ms(), Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failure.fetch_add(1, Ordering::Relaxed);
        self.last_failure_ms
            .store(current_unix_ms(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AtomicSnapshot {
        AtomicSnapshot {
            successes: self.success.load(Ordering::Relaxed),
            failures: self.failure.load(Ordering::Relaxed),
            last_success_ms: timestamp_to_option(self.last_success_ms.load(Ordering::Relaxed)),
            last_failure_ms: timestamp_to_option(self.last_failure_ms.load(Ordering::Relaxed)),
        }
    }
}

impl Default for AtomicMetric {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetryOutcomeStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RetryOutcomeMetadata {
    pub idempotency_key: Option<String>,
    pub attempt: Option<u32>,
    pub max_attempts: Option<u32>,
    pub backoff_ms: Option<u64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetricsSnapshot {
    pub submissions: AtomicSnapshot,
    pub confirmations: AtomicSnapshot,
    pub consecutive_failure: u64,
    pub last_outcome: Option<RetryOutcomeStatus>,
    pub last_metadata: Option<RetryOutcomeMetadata>,
}

/// ゲートウェイ呼び出しの成功/失敗カウンタ
#[derive(Debug, Default)]
pub struct SyncMetrics {
    submissions: AtomicMetric,
    confirmations: AtomicMetric,
    consecutive_failure: AtomicU64,
    last: Mutex<Option<(RetryOutcomeStatus, RetryOutcomeMetadata)>>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submission(&self, status: RetryOutcomeStatus, meta: RetryOutcomeMetadata) {
        match status {
            RetryOutcomeStatus::Success => {
                self.submissions.record_success();
                self.consecutive_failure.store(0, Ordering::Relaxed);
            }
            RetryOutcomeStatus::Failure => {
                self.submissions.record_failure();
                self.consecutive_failure.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Ok(mut guard) = self.last.lock() {
            *guard = Some((status, meta));
        }
    }

    pub fn record_confirmation(&self, status: RetryOutcomeStatus) {
        match status {
            RetryOutcomeStatus::Success => self.confirmations.record_success(),
            RetryOutcomeStatus::Failure => self.confirmations.record_failure(),
        }
    }

    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        let last = self
            .last
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default();

        SyncMetricsSnapshot {
            submissions: self.submissions.snapshot(),
            confirmations: self.confirmations.snapshot(),
            consecutive_failure: self.consecutive_failure.load(Ordering::Relaxed),
            last_outcome: last.as_ref().map(|(status, _)| *status),
            last_metadata: last.map(|(_, meta)| meta),
        }
    }
}

#[inline]
pub fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(UNSET_TS)
}

#[inline]
pub fn timestamp_to_option(value: u64) -> Option<u64> {
    if value == UNSET_TS { None } else { Some(value) }
}
