use crate::domain::entities::lifecycle::TransactionState;
use crate::domain::entities::payment_reference::PaymentReference;
use crate::domain::value_objects::IdempotencyKey;
use crate::shared::metrics::SyncMetricsSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters for a single drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub submitted: u32,
    pub awaiting: u32,
    pub confirmed: u32,
    pub failed: u32,
    pub retried: u32,
    pub deferred: u32,
    pub flagged: u32,
}

impl DrainReport {
    pub fn merge(&mut self, other: &DrainReport) {
        self.submitted += other.submitted;
        self.awaiting += other.awaiting;
        self.confirmed += other.confirmed;
        self.failed += other.failed;
        self.retried += other.retried;
        self.deferred += other.deferred;
        self.flagged += other.flagged;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum LastSyncResult {
    Completed {
        report: DrainReport,
        finished_at: DateTime<Utc>,
    },
    SkippedOffline {
        at: DateTime<Utc>,
    },
    Errored {
        message: String,
        at: DateTime<Utc>,
    },
}

/// UI向けの集計値。保存はせず毎回計算する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueSnapshot {
    pub pending_count: usize,
    pub oldest_pending_age_secs: Option<i64>,
    pub needs_review_count: usize,
    pub failed_count: usize,
    pub last_sync: Option<LastSyncResult>,
    pub online: bool,
    pub metrics: SyncMetricsSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatusView {
    pub idempotency_key: IdempotencyKey,
    pub state: TransactionState,
    pub attempt_count: u32,
    pub needs_review: bool,
    pub last_error: Option<String>,
    pub reference: Option<PaymentReference>,
}
