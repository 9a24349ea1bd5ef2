use super::connectivity::ConnectivityMonitor;
use super::offline_queue::{KeyGuard, OfflineQueue};
use super::retry_policy::RetryPolicy;
use crate::application::ports::payment_gateway::{
    GatewayError, InitializationRequest, IssuedReference, PaymentGateway,
};
use crate::application::ports::transaction_store::TransactionStore;
use crate::domain::entities::{
    ConfirmationOutcome, DrainReport, LastSyncResult, LifecycleEvent, PaymentReference,
    PaymentReferenceStatus, PendingTransaction, Resolution, TransactionState,
};
use crate::domain::status_table::GatewayStatusTable;
use crate::domain::value_objects::{GatewayStatusCode, IdempotencyKey, ReferenceCode};
use crate::shared::config::SyncConfig;
use crate::shared::error::AppError;
use crate::shared::metrics::{RetryOutcomeMetadata, RetryOutcomeStatus, SyncMetrics};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone, Copy)]
pub struct ReconcilerSettings {
    pub retry: RetryPolicy,
    pub max_workers: usize,
    pub call_timeout: Duration,
}

impl ReconcilerSettings {
    pub fn from_config(sync: &SyncConfig, call_timeout: Duration) -> Self {
        Self {
            retry: RetryPolicy::from_config(sync),
            max_workers: sync.max_workers.max(1),
            call_timeout,
        }
    }
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_workers: 4,
            call_timeout: Duration::from_secs(15),
        }
    }
}

/// Drives queued transactions through the gateway.
///
/// Submissions reuse the key generated at capture time, so a retry after a
/// lost response is answered with the reference the gateway already issued.
/// Each key is processed under its queue lock; distinct keys run concurrently
/// up to `max_workers`.
pub struct Reconciler {
    queue: Arc<OfflineQueue>,
    store: Arc<dyn TransactionStore>,
    gateway: Arc<dyn PaymentGateway>,
    connectivity: Arc<ConnectivityMonitor>,
    status_table: GatewayStatusTable,
    settings: ReconcilerSettings,
    metrics: Arc<SyncMetrics>,
    drain_gate: Mutex<()>,
    last_result: RwLock<Option<LastSyncResult>>,
}

impl Reconciler {
    pub fn new(
        queue: Arc<OfflineQueue>,
        store: Arc<dyn TransactionStore>,
        gateway: Arc<dyn PaymentGateway>,
        connectivity: Arc<ConnectivityMonitor>,
        status_table: GatewayStatusTable,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            queue,
            store,
            gateway,
            connectivity,
            status_table,
            settings,
            metrics: Arc::new(SyncMetrics::new()),
            drain_gate: Mutex::new(()),
            last_result: RwLock::new(None),
        }
    }

    pub fn metrics(&self) -> Arc<SyncMetrics> {
        Arc::clone(&self.metrics)
    }

    pub async fn last_result(&self) -> Option<LastSyncResult> {
        self.last_result.read().await.clone()
    }

    /// One pass over the pending queue.
    ///
    /// Returns `None` when another drain is already running. Nothing new is
    /// submitted once connectivity drops; in-flight calls finish normally.
    pub async fn drain(&self) -> Result<Option<DrainReport>, AppError> {
        let Ok(_gate) = self.drain_gate.try_lock() else {
            tracing::debug!(target: "sync::reconciler", "drain already running");
            return Ok(None);
        };

        if !self.connectivity.is_online() {
            tracing::debug!(target: "sync::reconciler", "offline; drain skipped");
            self.record(LastSyncResult::SkippedOffline { at: Utc::now() })
                .await;
            return Ok(Some(DrainReport::default()));
        }

        let pending = match self.queue.list_pending().await {
            Ok(pending) => pending,
            Err(err) => {
                self.record(LastSyncResult::Errored {
                    message: err.to_string(),
                    at: Utc::now(),
                })
                .await;
                return Err(err);
            }
        };
        tracing::info!(target: "sync::reconciler", pending = pending.len(), "drain started");

        let outcomes: Vec<(IdempotencyKey, Result<DrainReport, AppError>)> =
            stream::iter(pending.into_iter().map(|txn| txn.idempotency_key))
                .map(move |key| async move {
                    let outcome = self.process(&key).await;
                    (key, outcome)
                })
                .buffer_unordered(self.settings.max_workers.max(1))
                .collect()
                .await;

        let mut report = DrainReport::default();
        let mut errors = 0usize;
        for (key, outcome) in outcomes {
            match outcome {
                Ok(partial) => report.merge(&partial),
                Err(err) => {
                    errors += 1;
                    tracing::error!(target: "sync::reconciler", idempotency_key = %key, error = %err, "transaction processing failed");
                }
            }
        }

        tracing::info!(
            target: "sync::reconciler",
            submitted = report.submitted,
            confirmed = report.confirmed,
            failed = report.failed,
            retried = report.retried,
            deferred = report.deferred,
            flagged = report.flagged,
            errors,
            "drain finished"
        );
        self.record(LastSyncResult::Completed {
            report: report.clone(),
            finished_at: Utc::now(),
        })
        .await;
        Ok(Some(report))
    }

    /// Submits one queued transaction outside a drain.
    pub async fn submit(&self, key: &IdempotencyKey) -> Result<DrainReport, AppError> {
        let guard = self.queue.lock(key).await;
        let txn = self
            .queue
            .get(key)
            .await?
            .ok_or_else(|| AppError::not_found(format!("transaction {key}")))?;
        if txn.state != TransactionState::Queued {
            return Err(AppError::invalid_transition(format!(
                "{key}: {} cannot be submitted",
                txn.state
            )));
        }
        self.submit_locked(&guard, txn).await
    }

    /// Polls the gateway for one transaction awaiting confirmation.
    pub async fn confirm(&self, key: &IdempotencyKey) -> Result<DrainReport, AppError> {
        let guard = self.queue.lock(key).await;
        let txn = self
            .queue
            .get(key)
            .await?
            .ok_or_else(|| AppError::not_found(format!("transaction {key}")))?;
        if txn.state != TransactionState::AwaitingConfirmation {
            return Err(AppError::invalid_transition(format!(
                "{key}: {} is not awaiting confirmation",
                txn.state
            )));
        }
        self.confirm_locked(&guard, txn).await
    }

    async fn process(&self, key: &IdempotencyKey) -> Result<DrainReport, AppError> {
        let guard = self.queue.lock(key).await;
        // ロック待ちの間に解決済みになっている可能性がある
        let Some(mut txn) = self.queue.get(key).await? else {
            return Ok(DrainReport::default());
        };

        match txn.state {
            TransactionState::Resolved(_) => Ok(DrainReport::default()),
            TransactionState::AwaitingConfirmation => self.confirm_locked(&guard, txn).await,
            TransactionState::Submitting => {
                tracing::warn!(target: "sync::reconciler", idempotency_key = %key, attempts = txn.attempt_count, "recovering interrupted submission");
                txn.apply(LifecycleEvent::Interrupted, Utc::now())?;
                // 参照番号があれば確認待ちへ進めるので上限判定は不要
                if self.settings.retry.is_exhausted(txn.attempt_count)
                    && self.store.get_reference(key).await?.is_none()
                {
                    if txn.last_error.is_none() {
                        txn.last_error = Some("submission interrupted".to_string());
                    }
                    return self.flag_for_review(&guard, txn).await;
                }
                self.queue.save(&guard, &txn).await?;
                self.submit_locked(&guard, txn).await
            }
            TransactionState::Queued => self.submit_locked(&guard, txn).await,
        }
    }

    async fn submit_locked(
        &self,
        guard: &KeyGuard,
        mut txn: PendingTransaction,
    ) -> Result<DrainReport, AppError> {
        let mut report = DrainReport::default();
        let now = Utc::now();
        let key = txn.idempotency_key.clone();

        if txn.needs_review || !txn.is_due(now) || !self.connectivity.is_online() {
            report.deferred += 1;
            return Ok(report);
        }

        // 参照番号の保存後に落ちた場合は再送しない
        if let Some(existing) = self.store.get_reference(&key).await? {
            tracing::warn!(target: "sync::reconciler", idempotency_key = %key, reference = %existing.reference_code, "reference already recorded; skipping submission");
            txn.apply(LifecycleEvent::SubmitStarted, now)?;
            txn.apply(LifecycleEvent::ReferenceIssued, now)?;
            self.queue.save(guard, &txn).await?;
            report.awaiting += 1;
            return Ok(report);
        }

        txn.apply(LifecycleEvent::SubmitStarted, now)?;
        self.queue.save(guard, &txn).await?;

        let request = InitializationRequest {
            idempotency_key: key.clone(),
            amount: txn.payload.amount,
            payer: txn.payload.payer.clone(),
            revenue_code: txn.payload.revenue_code.clone(),
            collector_id: txn.payload.collector_id.clone(),
        };
        let result = self
            .with_timeout(self.gateway.initialize(&request))
            .await;
        let now = Utc::now();

        match result {
            Ok(issued) => {
                let attempt = txn.clone();
                match self.record_issued(guard, txn, issued).await {
                    Ok(partial) => report.merge(&partial),
                    Err(err) => {
                        // ゲートウェイ側は発行済み。同じキーで再送すれば同じ参照番号が返る
                        tracing::error!(
                            target: "sync::reconciler",
                            idempotency_key = %key,
                            error = %err,
                            "failed to record issued reference"
                        );
                        let partial = self.schedule_retry(guard, attempt, err.to_string()).await?;
                        report.merge(&partial);
                    }
                }
            }
            Err(err) if err.is_transient() => {
                let partial = self.schedule_retry(guard, txn, err.to_string()).await?;
                report.merge(&partial);
            }
            Err(err) => {
                txn.apply(LifecycleEvent::Rejected, now)?;
                txn.last_error = Some(err.to_string());
                self.queue.save(guard, &txn).await?;
                self.metrics.record_submission(
                    RetryOutcomeStatus::Failure,
                    self.metadata(&txn, None, Some(err.to_string())),
                );
                tracing::warn!(target: "sync::reconciler", idempotency_key = %key, error = %err, "gateway rejected payment");
                report.failed += 1;
            }
        }

        Ok(report)
    }

    async fn record_issued(
        &self,
        guard: &KeyGuard,
        mut txn: PendingTransaction,
        issued: IssuedReference,
    ) -> Result<DrainReport, AppError> {
        let now = Utc::now();
        let key = txn.idempotency_key.clone();
        let candidate = PaymentReference::issued(
            issued.reference_code,
            key.clone(),
            issued.status_code,
            issued.payment_url,
            now,
        );
        let stored = self.store.insert_reference_if_absent(&candidate).await?;
        if stored.reference_code != candidate.reference_code {
            tracing::warn!(
                target: "sync::reconciler",
                idempotency_key = %key,
                kept = %stored.reference_code,
                ignored = %candidate.reference_code,
                "gateway issued a second reference for the same key"
            );
        }

        txn.apply(LifecycleEvent::ReferenceIssued, now)?;
        txn.last_error = None;
        self.queue.save(guard, &txn).await?;

        self.metrics.record_submission(
            RetryOutcomeStatus::Success,
            self.metadata(&txn, None, None),
        );
        tracing::info!(
            target: "sync::reconciler",
            idempotency_key = %key,
            reference = %stored.reference_code,
            attempt = txn.attempt_count,
            "payment reference issued"
        );
        Ok(DrainReport {
            submitted: 1,
            awaiting: 1,
            ..DrainReport::default()
        })
    }

    /// Returns a failed submission to the queue with backoff, or flags it
    /// once the attempt budget is spent.
    async fn schedule_retry(
        &self,
        guard: &KeyGuard,
        mut txn: PendingTransaction,
        error: String,
    ) -> Result<DrainReport, AppError> {
        let now = Utc::now();
        txn.apply(LifecycleEvent::TransientFailure, now)?;
        txn.last_error = Some(error.clone());

        if self.settings.retry.is_exhausted(txn.attempt_count) {
            self.metrics.record_submission(
                RetryOutcomeStatus::Failure,
                self.metadata(&txn, None, Some(error)),
            );
            return self.flag_for_review(guard, txn).await;
        }

        let delay = self.settings.retry.delay(txn.attempt_count);
        let delay_chrono =
            chrono::Duration::from_std(delay).map_err(|e| AppError::Internal(e.to_string()))?;
        txn.next_attempt_at = Some(now + delay_chrono);
        self.queue.save(guard, &txn).await?;

        let backoff_ms = delay.as_millis() as u64;
        tracing::debug!(
            target: "sync::reconciler",
            idempotency_key = %txn.idempotency_key,
            attempt = txn.attempt_count,
            backoff_ms,
            error = %error,
            "submission failed; retry scheduled"
        );
        self.metrics.record_submission(
            RetryOutcomeStatus::Failure,
            self.metadata(&txn, Some(backoff_ms), Some(error)),
        );
        Ok(DrainReport {
            retried: 1,
            ..DrainReport::default()
        })
    }

    /// Parks a queued record until an operator requeues or purges it.
    async fn flag_for_review(
        &self,
        guard: &KeyGuard,
        mut txn: PendingTransaction,
    ) -> Result<DrainReport, AppError> {
        txn.needs_review = true;
        txn.next_attempt_at = None;
        self.queue.save(guard, &txn).await?;
        tracing::warn!(
            target: "sync::reconciler",
            idempotency_key = %txn.idempotency_key,
            attempts = txn.attempt_count,
            error = txn.last_error.as_deref().unwrap_or_default(),
            "attempt limit reached; flagged for review"
        );
        Ok(DrainReport {
            flagged: 1,
            ..DrainReport::default()
        })
    }

    async fn confirm_locked(
        &self,
        guard: &KeyGuard,
        txn: PendingTransaction,
    ) -> Result<DrainReport, AppError> {
        let key = txn.idempotency_key.clone();
        let Some(reference) = self.store.get_reference(&key).await? else {
            return self.requeue_lost_reference(guard, txn).await;
        };

        // 参照は確定済みだが取引の更新前に落ちた
        match reference.status {
            PaymentReferenceStatus::Confirmed => {
                return self.finish(guard, txn, ConfirmationOutcome::Confirmed, None).await
            }
            PaymentReferenceStatus::Failed => {
                return self.finish(guard, txn, ConfirmationOutcome::Failed, None).await
            }
            PaymentReferenceStatus::Initiated | PaymentReferenceStatus::PendingConfirmation => {}
        }

        if !self.connectivity.is_online() {
            return Ok(DrainReport {
                deferred: 1,
                ..DrainReport::default()
            });
        }

        match self
            .with_timeout(self.gateway.confirm(&reference.reference_code))
            .await
        {
            Ok(status) => self.apply_status(guard, txn, reference, status.status_code).await,
            Err(err) => {
                self.metrics.record_confirmation(RetryOutcomeStatus::Failure);
                tracing::debug!(
                    target: "sync::reconciler",
                    idempotency_key = %key,
                    reference = %reference.reference_code,
                    error = %err,
                    "confirmation lookup failed; still pending"
                );
                Ok(DrainReport {
                    awaiting: 1,
                    ..DrainReport::default()
                })
            }
        }
    }

    /// The stored reference is gone (quarantined). Resubmitting the same key
    /// gets the gateway to hand back the reference it already issued.
    async fn requeue_lost_reference(
        &self,
        guard: &KeyGuard,
        mut txn: PendingTransaction,
    ) -> Result<DrainReport, AppError> {
        txn.apply(LifecycleEvent::ReferenceLost, Utc::now())?;
        txn.last_error = Some("stored payment reference was unreadable".to_string());
        txn.next_attempt_at = None;
        self.queue.save(guard, &txn).await?;
        tracing::warn!(
            target: "sync::reconciler",
            idempotency_key = %txn.idempotency_key,
            "payment reference missing; requeued for resubmission"
        );
        Ok(DrainReport {
            deferred: 1,
            ..DrainReport::default()
        })
    }

    /// Applies a status pushed by the gateway for `reference_code`.
    ///
    /// Unknown references are treated as still pending. Returns the resulting
    /// transaction state when the key is known.
    pub async fn apply_confirmation(
        &self,
        reference_code: &ReferenceCode,
        status_code: GatewayStatusCode,
    ) -> Result<Option<TransactionState>, AppError> {
        let Some(reference) = self.store.find_reference_by_code(reference_code).await? else {
            tracing::warn!(target: "sync::reconciler", reference = %reference_code, status = %status_code, "confirmation for unknown reference ignored");
            return Ok(None);
        };

        let key = reference.idempotency_key.clone();
        let guard = self.queue.lock(&key).await;
        let reference = self.store.get_reference(&key).await?.unwrap_or(reference);

        let Some(txn) = self.queue.get(&key).await? else {
            // 確認済みで削除された取引
            return Ok(match reference.status {
                PaymentReferenceStatus::Confirmed => Some(TransactionState::Resolved(Resolution::Confirmed)),
                _ => None,
            });
        };

        if txn.state != TransactionState::AwaitingConfirmation {
            tracing::debug!(target: "sync::reconciler", idempotency_key = %key, state = %txn.state, "confirmation ignored for current state");
            return Ok(Some(txn.state));
        }
        if reference.status.is_terminal() {
            return Ok(Some(txn.state));
        }

        self.apply_status(&guard, txn, reference, status_code).await?;
        Ok(Some(
            self.queue
                .get(&key)
                .await?
                .map(|txn| txn.state)
                .unwrap_or(TransactionState::Resolved(Resolution::Confirmed)),
        ))
    }

    async fn apply_status(
        &self,
        guard: &KeyGuard,
        txn: PendingTransaction,
        mut reference: PaymentReference,
        status_code: GatewayStatusCode,
    ) -> Result<DrainReport, AppError> {
        let classification = self.status_table.classify(&status_code);
        if !classification.known {
            tracing::warn!(
                target: "sync::reconciler",
                idempotency_key = %txn.idempotency_key,
                reference = %reference.reference_code,
                status = %status_code,
                "unclassified gateway status; treating as pending"
            );
        }

        match classification.outcome {
            ConfirmationOutcome::StillPending => {
                if reference.status != PaymentReferenceStatus::PendingConfirmation
                    || reference.gateway_status_code.as_ref() != Some(&status_code)
                {
                    reference.record_outcome(
                        ConfirmationOutcome::StillPending,
                        status_code,
                        Utc::now(),
                    )?;
                    self.store.update_reference(&reference).await?;
                }
                Ok(DrainReport {
                    awaiting: 1,
                    ..DrainReport::default()
                })
            }
            outcome => {
                reference.record_outcome(outcome, status_code.clone(), Utc::now())?;
                self.store.update_reference(&reference).await?;
                self.metrics.record_confirmation(RetryOutcomeStatus::Success);
                self.finish(guard, txn, outcome, Some(status_code)).await
            }
        }
    }

    /// Moves the transaction to its terminal state once the reference is.
    async fn finish(
        &self,
        guard: &KeyGuard,
        mut txn: PendingTransaction,
        outcome: ConfirmationOutcome,
        status_code: Option<GatewayStatusCode>,
    ) -> Result<DrainReport, AppError> {
        let now = Utc::now();
        let key = txn.idempotency_key.clone();
        let mut report = DrainReport::default();

        match outcome {
            ConfirmationOutcome::Confirmed => {
                txn.apply(LifecycleEvent::Confirmed, now)?;
                txn.last_error = None;
                self.queue.save(guard, &txn).await?;
                self.queue.mark_resolved(guard).await?;
                tracing::info!(target: "sync::reconciler", idempotency_key = %key, "payment confirmed");
                report.confirmed += 1;
            }
            ConfirmationOutcome::Failed => {
                txn.apply(LifecycleEvent::Declined, now)?;
                txn.last_error = Some(match status_code {
                    Some(code) => format!("gateway declined payment ({code})"),
                    None => "gateway declined payment".to_string(),
                });
                self.queue.save(guard, &txn).await?;
                tracing::warn!(target: "sync::reconciler", idempotency_key = %key, "payment declined");
                report.failed += 1;
            }
            ConfirmationOutcome::StillPending => {
                report.awaiting += 1;
            }
        }
        Ok(report)
    }

    async fn with_timeout<T>(
        &self,
        call: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        match tokio::time::timeout(self.settings.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout),
        }
    }

    fn metadata(
        &self,
        txn: &PendingTransaction,
        backoff_ms: Option<u64>,
        reason: Option<String>,
    ) -> RetryOutcomeMetadata {
        RetryOutcomeMetadata {
            idempotency_key: Some(txn.idempotency_key.to_string()),
            attempt: Some(txn.attempt_count),
            max_attempts: Some(self.settings.retry.max_attempts()),
            backoff_ms,
            reason,
        }
    }

    async fn record(&self, result: LastSyncResult) {
        *self.last_result.write().await = Some(result);
    }
}
