use crate::application::ports::cache_store::CacheStore;
use crate::application::ports::network_fetcher::NetworkFetcher;
use crate::domain::entities::{
    CacheRequest, CachedEntry, InterceptedResponse, RequestMode, ResponseSource,
};
use crate::domain::value_objects::{CacheGeneration, RequestKey};
use crate::shared::config::CacheConfig;
use crate::shared::error::AppError;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

/// Shell resources kept available offline, one named generation at a time.
pub struct ResourceCacheManager {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn NetworkFetcher>,
    origin: Url,
    generation: CacheGeneration,
    manifest: Vec<String>,
    offline_fallback: String,
    active: RwLock<Option<CacheGeneration>>,
}

impl ResourceCacheManager {
    pub fn new(
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn NetworkFetcher>,
        origin: Url,
        generation: CacheGeneration,
        manifest: Vec<String>,
        offline_fallback: String,
    ) -> Self {
        Self {
            store,
            fetcher,
            origin,
            generation,
            manifest,
            offline_fallback,
            active: RwLock::new(None),
        }
    }

    pub fn from_config(
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn NetworkFetcher>,
        config: &CacheConfig,
    ) -> Result<Self, AppError> {
        let origin = Url::parse(&config.origin)?;
        let generation = CacheGeneration::new(config.generation.clone())
            .map_err(AppError::ConfigurationError)?;
        Ok(Self::new(
            store,
            fetcher,
            origin,
            generation,
            config.manifest.clone(),
            config.offline_fallback.clone(),
        ))
    }

    pub fn generation(&self) -> &CacheGeneration {
        &self.generation
    }

    pub async fn active_generation(&self) -> Option<CacheGeneration> {
        self.active.read().await.clone()
    }

    /// Picks up whichever generation a previous run activated.
    pub async fn load_active(&self) -> Result<Option<CacheGeneration>, AppError> {
        let active = self.store.active_generation().await?;
        *self.active.write().await = active.clone();
        Ok(active)
    }

    /// Fetches the whole manifest and stores it as this generation.
    ///
    /// Nothing is written unless every entry was fetched with a 2xx status.
    pub async fn install(&self) -> Result<usize, AppError> {
        let mut entries = Vec::with_capacity(self.manifest.len());
        let stored_at = Utc::now();

        for path in &self.manifest {
            let url = self.origin.join(path)?;
            let request = CacheRequest::get(url);
            let key = request.key().map_err(AppError::InvalidInput)?;

            let response = self.fetcher.fetch(&request).await.map_err(|err| {
                AppError::Cache(format!(
                    "install of {} aborted: {path}: {err}",
                    self.generation
                ))
            })?;
            if !response.is_success() {
                return Err(AppError::Cache(format!(
                    "install of {} aborted: {path} returned {}",
                    self.generation, response.status
                )));
            }

            entries.push(CachedEntry::from_response(
                key,
                self.generation.clone(),
                &response,
                stored_at,
            ));
        }

        self.store
            .install_generation(&self.generation, &entries)
            .await?;
        tracing::info!(
            target: "sync::cache",
            generation = %self.generation,
            entries = entries.len(),
            "cache generation installed"
        );
        Ok(entries.len())
    }

    /// Makes this generation the one that serves requests and drops every
    /// other generation. Refused until the generation is fully installed.
    pub async fn activate(&self) -> Result<Vec<CacheGeneration>, AppError> {
        if !self.store.is_installed(&self.generation).await? {
            return Err(AppError::Cache(format!(
                "generation {} is not installed",
                self.generation
            )));
        }

        let purged = self.store.activate(&self.generation).await?;
        *self.active.write().await = Some(self.generation.clone());

        tracing::info!(
            target: "sync::cache",
            generation = %self.generation,
            purged = ?purged.iter().map(CacheGeneration::as_str).collect::<Vec<_>>(),
            "cache generation activated"
        );
        Ok(purged)
    }

    pub async fn intercept(&self, request: &CacheRequest) -> Result<InterceptedResponse, AppError> {
        // 他オリジンと GET 以外は素通し
        if !self.is_same_origin(&request.url) || !request.is_get() {
            let response = self.fetcher.fetch(request).await?;
            return Ok(InterceptedResponse {
                response,
                source: ResponseSource::Network,
            });
        }

        let key = request.key().map_err(AppError::InvalidInput)?;
        match request.mode {
            RequestMode::Navigate => self.navigate(request, &key).await,
            RequestMode::Resource => self.network_first(request, &key).await,
        }
    }

    async fn navigate(
        &self,
        request: &CacheRequest,
        key: &RequestKey,
    ) -> Result<InterceptedResponse, AppError> {
        let err = match self.fetcher.fetch(request).await {
            Ok(response) => {
                return Ok(InterceptedResponse {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(err) => err,
        };

        if let Some(entry) = self.lookup(key).await? {
            return Ok(InterceptedResponse {
                response: entry.to_response(),
                source: ResponseSource::Cache,
            });
        }

        let fallback_url = self.origin.join(&self.offline_fallback)?;
        let fallback_key = CacheRequest::get(fallback_url)
            .key()
            .map_err(AppError::InvalidInput)?;
        if let Some(entry) = self.lookup(&fallback_key).await? {
            tracing::debug!(target: "sync::cache", url = %request.url, "serving offline shell");
            return Ok(InterceptedResponse {
                response: entry.to_response(),
                source: ResponseSource::OfflineFallback,
            });
        }

        tracing::warn!(target: "sync::cache", url = %request.url, error = %err, "navigation failed and no shell is cached");
        Err(err)
    }

    async fn network_first(
        &self,
        request: &CacheRequest,
        key: &RequestKey,
    ) -> Result<InterceptedResponse, AppError> {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    if let Some(generation) = self.active_generation().await {
                        let entry =
                            CachedEntry::from_response(key.clone(), generation, &response, Utc::now());
                        if let Err(err) = self.store.put(&entry).await {
                            tracing::warn!(target: "sync::cache", key = %key, error = %err, "failed to refresh cached entry");
                        }
                    }
                }
                Ok(InterceptedResponse {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(err) => match self.lookup(key).await? {
                Some(entry) => Ok(InterceptedResponse {
                    response: entry.to_response(),
                    source: ResponseSource::Cache,
                }),
                None => Err(err),
            },
        }
    }

    /// Reads from the active generation. An entry that fails its integrity
    /// check is dropped and reported as a miss.
    async fn lookup(&self, key: &RequestKey) -> Result<Option<CachedEntry>, AppError> {
        let Some(generation) = self.active_generation().await else {
            return Ok(None);
        };
        match self.store.get(&generation, key).await {
            Ok(entry) => Ok(entry),
            Err(AppError::StoreCorruption(reason)) => {
                tracing::warn!(target: "sync::cache", key = %key, generation = %generation, reason, "discarding unreadable cache entry");
                if let Err(err) = self.store.delete(&generation, key).await {
                    tracing::warn!(target: "sync::cache", key = %key, error = %err, "failed to delete unreadable cache entry");
                }
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin()
    }
}
