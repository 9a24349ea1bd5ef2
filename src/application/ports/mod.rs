pub mod cache_store;
pub mod network_fetcher;
pub mod payment_gateway;
pub mod reachability;
pub mod transaction_store;

pub use cache_store::CacheStore;
pub use network_fetcher::NetworkFetcher;
pub use payment_gateway::{
    GatewayError, InitializationRequest, IssuedReference, PaymentGateway, ReferenceStatusReport,
};
pub use reachability::ReachabilityProbe;
pub use transaction_store::TransactionStore;
