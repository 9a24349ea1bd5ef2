pub mod cache_manager;
pub mod connectivity;
pub mod offline_queue;
pub mod read_model;
pub mod reconciler;
pub mod retry_policy;
pub mod scheduler;

pub use cache_manager::ResourceCacheManager;
pub use connectivity::{ConnectivityMonitor, ConnectivityState, PlatformSignal};
pub use offline_queue::{KeyGuard, OfflineQueue};
pub use read_model::SyncReadModel;
pub use reconciler::{Reconciler, ReconcilerSettings};
pub use retry_policy::RetryPolicy;
pub use scheduler::SyncScheduler;
