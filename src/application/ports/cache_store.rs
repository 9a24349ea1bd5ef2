use crate::domain::entities::CachedEntry;
use crate::domain::value_objects::{CacheGeneration, RequestKey};
use crate::shared::error::AppError;
use async_trait::async_trait;

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Writes a whole generation in one transaction. Nothing is visible if
    /// any entry fails to persist.
    async fn install_generation(
        &self,
        generation: &CacheGeneration,
        entries: &[CachedEntry],
    ) -> Result<(), AppError>;
    async fn is_installed(&self, generation: &CacheGeneration) -> Result<bool, AppError>;
    async fn put(&self, entry: &CachedEntry) -> Result<(), AppError>;
    async fn get(
        &self,
        generation: &CacheGeneration,
        key: &RequestKey,
    ) -> Result<Option<CachedEntry>, AppError>;
    async fn delete(&self, generation: &CacheGeneration, key: &RequestKey)
        -> Result<bool, AppError>;
    async fn list_generations(&self) -> Result<Vec<CacheGeneration>, AppError>;
    async fn active_generation(&self) -> Result<Option<CacheGeneration>, AppError>;
    /// Marks `generation` active and deletes every other generation atomically.
    /// Returns the names that were purged.
    async fn activate(&self, generation: &CacheGeneration)
        -> Result<Vec<CacheGeneration>, AppError>;
}
