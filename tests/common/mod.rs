#![allow(dead_code)]

pub mod mocks;

use chrono::{DateTime, Utc};
use collector_sync::application::ports::TransactionStore;
use collector_sync::application::services::{
    ConnectivityMonitor, OfflineQueue, PlatformSignal, Reconciler, ReconcilerSettings,
    RetryPolicy, SyncReadModel,
};
use collector_sync::domain::entities::{PaymentPayload, PendingTransaction};
use collector_sync::domain::value_objects::{
    Amount, CollectorId, IdempotencyKey, PayerIdentity, RevenueCode,
};
use collector_sync::domain::GatewayStatusTable;
use collector_sync::infrastructure::offline::SqliteTransactionStore;
use mocks::{MockGateway, ScriptedProbe};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use std::time::Duration;

pub struct SyncTestContext {
    pub pool: Pool<Sqlite>,
    pub store: Arc<dyn TransactionStore>,
    pub queue: Arc<OfflineQueue>,
    pub gateway: Arc<MockGateway>,
    pub probe: Arc<ScriptedProbe>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub reconciler: Arc<Reconciler>,
    pub read_model: SyncReadModel,
}

pub fn fast_settings() -> ReconcilerSettings {
    ReconcilerSettings {
        retry: RetryPolicy::new(Duration::from_secs(2), Duration::from_secs(300), 5),
        max_workers: 4,
        call_timeout: Duration::from_secs(2),
    }
}

pub async fn setup_sync() -> SyncTestContext {
    setup_sync_with(fast_settings()).await
}

pub async fn setup_sync_with(settings: ReconcilerSettings) -> SyncTestContext {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");

    let store: Arc<dyn TransactionStore> = Arc::new(SqliteTransactionStore::new(pool.clone()));
    let queue = Arc::new(OfflineQueue::new(Arc::clone(&store)));
    let gateway = Arc::new(MockGateway::default());
    let probe = Arc::new(ScriptedProbe::default());
    let connectivity = Arc::new(ConnectivityMonitor::new(
        probe.clone(),
        Duration::from_secs(1),
    ));
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&queue),
        Arc::clone(&store),
        gateway.clone(),
        Arc::clone(&connectivity),
        GatewayStatusTable::default(),
        settings,
    ));
    let read_model = SyncReadModel::new(
        Arc::clone(&queue),
        Arc::clone(&store),
        Arc::clone(&reconciler),
        Arc::clone(&connectivity),
    );

    SyncTestContext {
        pool,
        store,
        queue,
        gateway,
        probe,
        connectivity,
        reconciler,
        read_model,
    }
}

impl SyncTestContext {
    pub async fn go_online(&self) {
        self.probe.set_reachable(true);
        self.connectivity
            .report_platform_signal(PlatformSignal::Online)
            .await;
        assert!(self.connectivity.is_online(), "probe should confirm online");
    }

    pub async fn go_offline(&self) {
        self.probe.set_reachable(false);
        self.connectivity
            .report_platform_signal(PlatformSignal::Offline)
            .await;
    }

    pub async fn capture(&self, naira: i64) -> IdempotencyKey {
        self.queue
            .enqueue(payload(naira, Utc::now()))
            .await
            .expect("enqueue")
    }

    pub async fn transaction(&self, key: &IdempotencyKey) -> PendingTransaction {
        self.queue
            .get(key)
            .await
            .expect("get")
            .expect("transaction present")
    }

    /// Pulls the next retry forward so the following drain picks it up.
    pub async fn make_due(&self, key: &IdempotencyKey) {
        let guard = self.queue.lock(key).await;
        let mut txn = self.transaction(key).await;
        txn.next_attempt_at = None;
        self.queue.save(&guard, &txn).await.expect("save");
    }

    pub async fn drain(&self) -> collector_sync::domain::entities::DrainReport {
        self.reconciler
            .drain()
            .await
            .expect("drain")
            .expect("no concurrent drain")
    }
}

pub fn payload(naira: i64, captured_at: DateTime<Utc>) -> PaymentPayload {
    PaymentPayload {
        payer: PayerIdentity::new(
            "Chinedu Okafor".into(),
            Some("08031234567".into()),
            None,
        )
        .expect("payer"),
        amount: Amount::from_naira(naira).expect("amount"),
        revenue_code: RevenueCode::new("MKT-LEVY".into()).expect("revenue code"),
        collector_id: CollectorId::new("collector-12".into()).expect("collector"),
        location: None,
        captured_at,
    }
}
