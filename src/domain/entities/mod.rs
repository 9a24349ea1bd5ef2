pub mod cached_entry;
pub mod lifecycle;
pub mod payment_reference;
pub mod pending_transaction;
pub mod sync_snapshot;

pub use cached_entry::{
    CacheRequest, CachedEntry, FetchedResponse, InterceptedResponse, RequestMode, ResponseSource,
};
pub use lifecycle::{
    ConfirmationOutcome, LifecycleEvent, PaymentReferenceStatus, Resolution, TransactionState,
};
pub use payment_reference::PaymentReference;
pub use pending_transaction::{PaymentPayload, PendingTransaction};
pub use sync_snapshot::{DrainReport, LastSyncResult, SyncQueueSnapshot, TransactionStatusView};
