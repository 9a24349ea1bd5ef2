use crate::application::ports::{CacheStore, TransactionStore};
use crate::application::services::{
    ConnectivityMonitor, OfflineQueue, Reconciler, ReconcilerSettings, ResourceCacheManager,
    SyncReadModel, SyncScheduler,
};
use crate::domain::GatewayStatusTable;
use crate::infrastructure::cache::{HttpNetworkFetcher, SqliteCacheStore};
use crate::infrastructure::connectivity::HttpReachabilityProbe;
use crate::infrastructure::database::connection_pool::ConnectionPool;
use crate::infrastructure::gateway::HttpPaymentGateway;
use crate::infrastructure::offline::SqliteTransactionStore;
use crate::shared::config::AppConfig;
use std::sync::Arc;
use std::time::Duration;

/// 同期コア全体の配線
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pool: ConnectionPool,
    pub store: Arc<dyn TransactionStore>,
    pub queue: Arc<OfflineQueue>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub reconciler: Arc<Reconciler>,
    pub read_model: Arc<SyncReadModel>,
    pub cache: Arc<ResourceCacheManager>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

        let pool = ConnectionPool::new(&config.database).await?;
        pool.migrate().await?;

        let store: Arc<dyn TransactionStore> =
            Arc::new(SqliteTransactionStore::new(pool.get_pool().clone()));
        let cache_store: Arc<dyn CacheStore> =
            Arc::new(SqliteCacheStore::new(pool.get_pool().clone()));

        let queue = Arc::new(OfflineQueue::new(Arc::clone(&store)));
        let connectivity = Arc::new(ConnectivityMonitor::new(
            Arc::new(HttpReachabilityProbe::new(&config.connectivity)?),
            Duration::from_secs(config.connectivity.probe_timeout),
        ));

        let gateway = Arc::new(HttpPaymentGateway::new(&config.gateway)?);
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&queue),
            Arc::clone(&store),
            gateway,
            Arc::clone(&connectivity),
            GatewayStatusTable::default(),
            ReconcilerSettings::from_config(
                &config.sync,
                Duration::from_secs(config.gateway.request_timeout),
            ),
        ));

        let read_model = Arc::new(SyncReadModel::new(
            Arc::clone(&queue),
            Arc::clone(&store),
            Arc::clone(&reconciler),
            Arc::clone(&connectivity),
        ));

        let fetcher = Arc::new(HttpNetworkFetcher::new(Duration::from_secs(
            config.cache.fetch_timeout,
        ))?);
        let cache = Arc::new(ResourceCacheManager::from_config(
            cache_store,
            fetcher,
            &config.cache,
        )?);
        cache.load_active().await?;

        Ok(Self {
            config: Arc::new(config),
            pool,
            store,
            queue,
            connectivity,
            reconciler,
            read_model,
            cache,
        })
    }

    pub fn scheduler(&self) -> SyncScheduler {
        SyncScheduler::new(
            Arc::clone(&self.reconciler),
            Arc::clone(&self.connectivity),
            self.config.sync.sync_interval(),
        )
    }

    pub async fn shutdown(&self) {
        self.pool.close().await;
    }
}
