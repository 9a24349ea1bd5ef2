pub mod http_fetcher;
pub mod sqlite_cache_store;

pub use http_fetcher::HttpNetworkFetcher;
pub use sqlite_cache_store::SqliteCacheStore;
