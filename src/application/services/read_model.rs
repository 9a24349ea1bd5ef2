use super::connectivity::ConnectivityMonitor;
use super::offline_queue::OfflineQueue;
use super::reconciler::Reconciler;
use crate::application::ports::transaction_store::TransactionStore;
use crate::domain::entities::{
    PaymentReferenceStatus, Resolution, SyncQueueSnapshot, TransactionState,
    TransactionStatusView,
};
use crate::domain::value_objects::IdempotencyKey;
use crate::shared::error::AppError;
use chrono::Utc;
use std::sync::Arc;

/// 画面表示用の読み取り専用ビュー
pub struct SyncReadModel {
    queue: Arc<OfflineQueue>,
    store: Arc<dyn TransactionStore>,
    reconciler: Arc<Reconciler>,
    connectivity: Arc<ConnectivityMonitor>,
}

impl SyncReadModel {
    pub fn new(
        queue: Arc<OfflineQueue>,
        store: Arc<dyn TransactionStore>,
        reconciler: Arc<Reconciler>,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self {
            queue,
            store,
            reconciler,
            connectivity,
        }
    }

    pub async fn snapshot(&self) -> Result<SyncQueueSnapshot, AppError> {
        let records = self.queue.list_all().await?;
        let now = Utc::now();

        let pending: Vec<_> = records.iter().filter(|t| t.is_pending()).collect();
        let oldest_pending_age_secs = pending
            .iter()
            .map(|t| t.captured_at())
            .min()
            .map(|oldest| (now - oldest).num_seconds().max(0));

        Ok(SyncQueueSnapshot {
            pending_count: pending.len(),
            oldest_pending_age_secs,
            needs_review_count: pending.iter().filter(|t| t.needs_review).count(),
            failed_count: records
                .iter()
                .filter(|t| t.state == TransactionState::Resolved(Resolution::Failed))
                .count(),
            last_sync: self.reconciler.last_result().await,
            online: self.connectivity.is_online(),
            metrics: self.reconciler.metrics().snapshot(),
        })
    }

    /// Current view of one capture. Confirmed transactions have left the
    /// queue, so their state comes from the stored reference.
    pub async fn transaction_status(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<TransactionStatusView>, AppError> {
        let reference = self.store.get_reference(key).await?;

        if let Some(txn) = self.queue.get(key).await? {
            return Ok(Some(TransactionStatusView {
                idempotency_key: txn.idempotency_key,
                state: txn.state,
                attempt_count: txn.attempt_count,
                needs_review: txn.needs_review,
                last_error: txn.last_error,
                reference,
            }));
        }

        Ok(reference
            .filter(|r| r.status == PaymentReferenceStatus::Confirmed)
            .map(|reference| TransactionStatusView {
                idempotency_key: key.clone(),
                state: TransactionState::Resolved(Resolution::Confirmed),
                attempt_count: 0,
                needs_review: false,
                last_error: None,
                reference: Some(reference),
            }))
    }
}
