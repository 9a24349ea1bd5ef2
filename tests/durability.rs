mod common;

use chrono::{Duration, Utc};
use collector_sync::application::ports::TransactionStore;
use collector_sync::application::services::OfflineQueue;
use collector_sync::domain::entities::TransactionState;
use collector_sync::infrastructure::database::ConnectionPool;
use collector_sync::infrastructure::offline::SqliteTransactionStore;
use collector_sync::shared::config::DatabaseConfig;
use common::{payload, setup_sync};
use std::sync::Arc;

async fn open(url: &str) -> (ConnectionPool, OfflineQueue, Arc<dyn TransactionStore>) {
    let pool = ConnectionPool::new(&DatabaseConfig {
        url: url.to_string(),
        max_connections: 2,
        connection_timeout: 5,
    })
    .await
    .unwrap();
    pool.migrate().await.unwrap();
    let store: Arc<dyn TransactionStore> =
        Arc::new(SqliteTransactionStore::new(pool.get_pool().clone()));
    (pool, OfflineQueue::new(Arc::clone(&store)), store)
}

#[tokio::test]
async fn queued_captures_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("collector.db").display());
    let now = Utc::now();

    let (pool, queue, _) = open(&url).await;
    let later = queue.enqueue(payload(2_000, now)).await.unwrap();
    let earlier = queue
        .enqueue(payload(50_000, now - Duration::hours(3)))
        .await
        .unwrap();
    pool.close().await;

    let (pool, queue, _) = open(&url).await;
    let pending = queue.list_pending().await.unwrap();
    let keys: Vec<_> = pending.iter().map(|t| t.idempotency_key.clone()).collect();
    assert_eq!(keys, vec![earlier, later]);
    assert_eq!(pending[0].payload.amount.minor_units(), 5_000_000);
    pool.close().await;
}

#[tokio::test]
async fn corrupt_record_is_quarantined() {
    let ctx = setup_sync().await;
    let good = ctx.capture(1_000).await;

    sqlx::query(
        "INSERT INTO pending_transactions (idempotency_key, captured_at, updated_at, record) VALUES (?1, ?2, ?2, ?3)",
    )
    .bind("9a1f0c7e-0000-4000-8000-000000000001")
    .bind(Utc::now().timestamp_millis())
    .bind("{not json")
    .execute(&ctx.pool)
    .await
    .unwrap();

    let pending = ctx.queue.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].idempotency_key, good);
    assert_eq!(ctx.store.quarantined_count().await.unwrap(), 1);
}

#[tokio::test]
async fn unreadable_reference_is_quarantined_and_recovered() {
    let ctx = setup_sync().await;
    ctx.go_online().await;
    let key = ctx.capture(50_000).await;
    let report = ctx.drain().await;
    assert_eq!(report.awaiting, 1);

    sqlx::query("UPDATE payment_references SET status = 'garbled' WHERE idempotency_key = ?1")
        .bind(key.as_str())
        .execute(&ctx.pool)
        .await
        .unwrap();

    let report = ctx.drain().await;
    assert_eq!(report.deferred, 1);
    assert_eq!(ctx.store.quarantined_count().await.unwrap(), 1);

    let view = ctx.read_model.transaction_status(&key).await.unwrap().unwrap();
    assert_eq!(view.state, TransactionState::Queued);
    assert!(view.reference.is_none());

    // 同じキーで再送するとゲートウェイは同じ参照番号を返す
    let report = ctx.drain().await;
    assert_eq!(report.submitted, 1);
    assert_eq!(
        ctx.store.get_reference(&key).await.unwrap().unwrap().reference_code.as_str(),
        "RRR-1"
    );
    assert_eq!(ctx.gateway.issued_count(), 1);

    ctx.gateway.set_status("RRR-1", "00");
    let report = ctx.drain().await;
    assert_eq!(report.confirmed, 1);
}
