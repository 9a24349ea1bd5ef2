use crate::domain::value_objects::{CacheGeneration, RequestKey};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Navigate,
    Resource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRequest {
    pub method: String,
    pub url: Url,
    pub mode: RequestMode,
}

impl CacheRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            mode: RequestMode::Resource,
        }
    }

    pub fn navigate(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            mode: RequestMode::Navigate,
        }
    }

    pub fn key(&self) -> Result<RequestKey, String> {
        RequestKey::new(&self.method, &self.url)
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchedResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Where the response handed back by the cache manager came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    OfflineFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedResponse {
    pub response: FetchedResponse,
    pub source: ResponseSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub request_key: RequestKey,
    pub generation: CacheGeneration,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub stored_at: DateTime<Utc>,
}

impl CachedEntry {
    pub fn from_response(
        request_key: RequestKey,
        generation: CacheGeneration,
        response: &FetchedResponse,
        stored_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_key,
            generation,
            status: response.status,
            content_type: response.content_type.clone(),
            body: response.body.clone(),
            stored_at,
        }
    }

    pub fn to_response(&self) -> FetchedResponse {
        FetchedResponse {
            status: self.status,
            content_type: self.content_type.clone(),
            body: self.body.clone(),
        }
    }
}
