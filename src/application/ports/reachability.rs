use async_trait::async_trait;

#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Lightweight check that the backend can actually be reached.
    async fn probe(&self) -> bool;
}
