use crate::domain::entities::{CacheRequest, FetchedResponse};
use crate::shared::error::AppError;
use async_trait::async_trait;

/// Performs the real network request behind the cache manager.
///
/// Any HTTP status is a successful fetch; `Err` means the network itself failed.
#[async_trait]
pub trait NetworkFetcher: Send + Sync {
    async fn fetch(&self, request: &CacheRequest) -> Result<FetchedResponse, AppError>;
}
