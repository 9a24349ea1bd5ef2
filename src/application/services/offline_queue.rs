use crate::application::ports::transaction_store::TransactionStore;
use crate::domain::entities::{PaymentPayload, PendingTransaction, Resolution, TransactionState};
use crate::domain::value_objects::IdempotencyKey;
use crate::shared::error::AppError;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Exclusive hold on one idempotency key.
///
/// Every mutation of a queued transaction goes through a guard, so two
/// workers can never interleave writes for the same key.
pub struct KeyGuard {
    key: IdempotencyKey,
    _guard: OwnedMutexGuard<()>,
}

impl KeyGuard {
    pub fn key(&self) -> &IdempotencyKey {
        &self.key
    }
}

#[derive(Default)]
struct KeyLocks {
    inner: StdMutex<HashMap<IdempotencyKey, Weak<Mutex<()>>>>,
}

impl KeyLocks {
    fn handle(&self, key: &IdempotencyKey) -> Arc<Mutex<()>> {
        let mut map = match self.inner.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        // 参照されていないロックを掃除
        map.retain(|_, lock| lock.strong_count() > 0);

        if let Some(existing) = map.get(key).and_then(Weak::upgrade) {
            return existing;
        }
        let lock = Arc::new(Mutex::new(()));
        map.insert(key.clone(), Arc::downgrade(&lock));
        lock
    }
}

/// Durable FIFO of captured payments waiting for the gateway.
pub struct OfflineQueue {
    store: Arc<dyn TransactionStore>,
    locks: KeyLocks,
}

impl OfflineQueue {
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self {
            store,
            locks: KeyLocks::default(),
        }
    }

    /// Persists a new capture under a freshly generated key. The record is
    /// durable before the key is handed back.
    pub async fn enqueue(&self, payload: PaymentPayload) -> Result<IdempotencyKey, AppError> {
        let key = IdempotencyKey::generate();
        let guard = self.lock(&key).await;
        let transaction = PendingTransaction::new(key.clone(), payload);
        self.store.put(&transaction).await?;
        drop(guard);

        tracing::info!(
            target: "sync::queue",
            idempotency_key = %key,
            amount = %transaction.payload.amount,
            "captured payment queued"
        );
        Ok(key)
    }

    pub async fn lock(&self, key: &IdempotencyKey) -> KeyGuard {
        let handle = self.locks.handle(key);
        KeyGuard {
            key: key.clone(),
            _guard: handle.lock_owned().await,
        }
    }

    pub async fn get(&self, key: &IdempotencyKey) -> Result<Option<PendingTransaction>, AppError> {
        self.store.get(key).await
    }

    /// Non-terminal transactions, oldest capture first.
    pub async fn list_pending(&self) -> Result<Vec<PendingTransaction>, AppError> {
        let mut pending: Vec<_> = self
            .store
            .list_all()
            .await?
            .into_iter()
            .filter(PendingTransaction::is_pending)
            .collect();
        pending.sort_by(|a, b| {
            a.captured_at()
                .cmp(&b.captured_at())
                .then_with(|| a.idempotency_key.cmp(&b.idempotency_key))
        });
        Ok(pending)
    }

    /// Every stored record, including resolved failures kept for audit.
    pub async fn list_all(&self) -> Result<Vec<PendingTransaction>, AppError> {
        self.store.list_all().await
    }

    /// Writes `transaction` back. A record that is already terminal in the
    /// store can only be rewritten with the same state.
    pub async fn save(
        &self,
        guard: &KeyGuard,
        transaction: &PendingTransaction,
    ) -> Result<(), AppError> {
        ensure_guard(guard, &transaction.idempotency_key)?;

        if let Some(stored) = self.store.get(&transaction.idempotency_key).await? {
            if stored.state.is_terminal() && stored.state != transaction.state {
                return Err(AppError::invalid_transition(format!(
                    "{}: {} cannot become {}",
                    transaction.idempotency_key, stored.state, transaction.state
                )));
            }
        }

        self.store.put(transaction).await
    }

    /// Drops a transaction whose gateway outcome is final.
    pub async fn mark_resolved(&self, guard: &KeyGuard) -> Result<(), AppError> {
        let key = guard.key();
        let stored = self
            .store
            .get(key)
            .await?
            .ok_or_else(|| AppError::not_found(format!("transaction {key}")))?;

        if !stored.state.is_terminal() {
            return Err(AppError::invalid_transition(format!(
                "{key}: {} is not resolved",
                stored.state
            )));
        }

        self.store.delete(key).await?;
        tracing::debug!(target: "sync::queue", idempotency_key = %key, state = %stored.state, "transaction removed from queue");
        Ok(())
    }

    /// Clears the review flag so the next drain tries the key again with a
    /// fresh attempt budget.
    pub async fn requeue_for_review(&self, key: &IdempotencyKey) -> Result<(), AppError> {
        let guard = self.lock(key).await;
        let mut transaction = self
            .store
            .get(key)
            .await?
            .ok_or_else(|| AppError::not_found(format!("transaction {key}")))?;

        if !transaction.needs_review || transaction.state != TransactionState::Queued {
            return Err(AppError::InvalidInput(format!(
                "{key} is not waiting for review"
            )));
        }

        transaction.needs_review = false;
        transaction.attempt_count = 0;
        transaction.next_attempt_at = None;
        transaction.updated_at = Utc::now();
        self.save(&guard, &transaction).await?;

        tracing::info!(target: "sync::queue", idempotency_key = %key, "transaction requeued by operator");
        Ok(())
    }

    /// Removes a flagged or declined record. Anything the gateway may still
    /// settle is refused.
    pub async fn purge(&self, key: &IdempotencyKey) -> Result<(), AppError> {
        let _guard = self.lock(key).await;
        let transaction = self
            .store
            .get(key)
            .await?
            .ok_or_else(|| AppError::not_found(format!("transaction {key}")))?;

        let purgeable = match transaction.state {
            TransactionState::Resolved(Resolution::Failed) => true,
            TransactionState::Queued => transaction.needs_review,
            TransactionState::Submitting
            | TransactionState::AwaitingConfirmation
            | TransactionState::Resolved(Resolution::Confirmed) => false,
        };
        if !purgeable {
            return Err(AppError::InvalidInput(format!(
                "{key} is {} and cannot be purged",
                transaction.state
            )));
        }

        self.store.delete(key).await?;
        tracing::warn!(target: "sync::queue", idempotency_key = %key, state = %transaction.state, "transaction purged by operator");
        Ok(())
    }
}

fn ensure_guard(guard: &KeyGuard, key: &IdempotencyKey) -> Result<(), AppError> {
    if guard.key() != key {
        return Err(AppError::Internal(format!(
            "lock for {} used to write {key}",
            guard.key()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::pending_transaction::fixtures::payload_at;
    use crate::domain::entities::LifecycleEvent;
    use crate::infrastructure::offline::SqliteTransactionStore;
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_queue() -> OfflineQueue {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        OfflineQueue::new(Arc::new(SqliteTransactionStore::new(pool)))
    }

    #[tokio::test]
    async fn enqueue_assigns_unique_keys() {
        let queue = setup_queue().await;
        let now = Utc::now();

        let first = queue.enqueue(payload_at(now)).await.unwrap();
        let second = queue.enqueue(payload_at(now)).await.unwrap();

        assert_ne!(first, second);
        let pending = queue.list_pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|t| t.state == TransactionState::Queued));
    }

    #[tokio::test]
    async fn list_pending_is_oldest_first_and_skips_resolved() {
        let queue = setup_queue().await;
        let now = Utc::now();

        let newer = queue.enqueue(payload_at(now)).await.unwrap();
        let older = queue
            .enqueue(payload_at(now - Duration::minutes(10)))
            .await
            .unwrap();
        let declined = queue
            .enqueue(payload_at(now - Duration::minutes(20)))
            .await
            .unwrap();

        let guard = queue.lock(&declined).await;
        let mut txn = queue.get(&declined).await.unwrap().unwrap();
        txn.apply(LifecycleEvent::SubmitStarted, now).unwrap();
        txn.apply(LifecycleEvent::Rejected, now).unwrap();
        queue.save(&guard, &txn).await.unwrap();
        drop(guard);

        let keys: Vec<_> = queue
            .list_pending()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.idempotency_key)
            .collect();
        assert_eq!(keys, vec![older, newer]);
        assert_eq!(queue.list_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn save_refuses_to_reopen_terminal_record() {
        let queue = setup_queue().await;
        let now = Utc::now();
        let key = queue.enqueue(payload_at(now)).await.unwrap();

        let guard = queue.lock(&key).await;
        let mut txn = queue.get(&key).await.unwrap().unwrap();
        let queued = txn.clone();
        txn.apply(LifecycleEvent::SubmitStarted, now).unwrap();
        txn.apply(LifecycleEvent::Rejected, now).unwrap();
        queue.save(&guard, &txn).await.unwrap();

        let err = queue.save(&guard, &queued).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn mark_resolved_requires_terminal_state() {
        let queue = setup_queue().await;
        let key = queue.enqueue(payload_at(Utc::now())).await.unwrap();

        let guard = queue.lock(&key).await;
        assert!(queue.mark_resolved(&guard).await.is_err());
        assert!(queue.get(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn purge_only_removes_flagged_records() {
        let queue = setup_queue().await;
        let key = queue.enqueue(payload_at(Utc::now())).await.unwrap();

        assert!(matches!(
            queue.purge(&key).await.unwrap_err(),
            AppError::InvalidInput(_)
        ));

        {
            let guard = queue.lock(&key).await;
            let mut txn = queue.get(&key).await.unwrap().unwrap();
            txn.needs_review = true;
            queue.save(&guard, &txn).await.unwrap();
        }

        queue.purge(&key).await.unwrap();
        assert!(queue.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn requeue_resets_attempt_budget() {
        let queue = setup_queue().await;
        let key = queue.enqueue(payload_at(Utc::now())).await.unwrap();

        {
            let guard = queue.lock(&key).await;
            let mut txn = queue.get(&key).await.unwrap().unwrap();
            txn.attempt_count = 5;
            txn.needs_review = true;
            queue.save(&guard, &txn).await.unwrap();
        }

        queue.requeue_for_review(&key).await.unwrap();
        let txn = queue.get(&key).await.unwrap().unwrap();
        assert!(!txn.needs_review);
        assert_eq!(txn.attempt_count, 0);
        assert!(queue.requeue_for_review(&key).await.is_err());
    }

    #[tokio::test]
    async fn lock_serializes_same_key() {
        let queue = Arc::new(setup_queue().await);
        let key = queue.enqueue(payload_at(Utc::now())).await.unwrap();

        let guard = queue.lock(&key).await;
        let contender = {
            let queue = Arc::clone(&queue);
            let key = key.clone();
            tokio::spawn(async move {
                let _guard = queue.lock(&key).await;
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.unwrap();
    }
}
