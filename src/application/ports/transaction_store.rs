use crate::domain::entities::{PaymentReference, PendingTransaction};
use crate::domain::value_objects::{IdempotencyKey, ReferenceCode};
use crate::shared::error::AppError;
use async_trait::async_trait;

/// Durable, key-scoped storage for queued transactions and issued references.
///
/// Every method is atomic for the key it touches; there is no bulk rewrite.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn put(&self, transaction: &PendingTransaction) -> Result<(), AppError>;
    async fn get(&self, key: &IdempotencyKey) -> Result<Option<PendingTransaction>, AppError>;
    async fn delete(&self, key: &IdempotencyKey) -> Result<bool, AppError>;
    /// Ordered by capture time, oldest first. Unreadable rows are quarantined
    /// and left out of the result.
    async fn list_all(&self) -> Result<Vec<PendingTransaction>, AppError>;

    /// Records `reference` unless one already exists for its key, and returns
    /// whichever reference is stored afterwards.
    async fn insert_reference_if_absent(
        &self,
        reference: &PaymentReference,
    ) -> Result<PaymentReference, AppError>;
    async fn update_reference(&self, reference: &PaymentReference) -> Result<(), AppError>;
    async fn get_reference(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<PaymentReference>, AppError>;
    async fn find_reference_by_code(
        &self,
        code: &ReferenceCode,
    ) -> Result<Option<PaymentReference>, AppError>;

    async fn quarantined_count(&self) -> Result<u64, AppError>;
}
