use async_trait::async_trait;
use bytes::Bytes;
use collector_sync::application::ports::NetworkFetcher;
use collector_sync::domain::entities::{CacheRequest, FetchedResponse};
use collector_sync::AppError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct ScriptedFetcher {
    offline: AtomicBool,
    pages: Mutex<HashMap<String, (u16, Bytes)>>,
}

impl ScriptedFetcher {
    pub fn serve(&self, url: &str, status: u16, body: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, Bytes::from(body.to_string())));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl NetworkFetcher for ScriptedFetcher {
    async fn fetch(&self, request: &CacheRequest) -> Result<FetchedResponse, AppError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::Network(format!("{} unreachable", request.url)));
        }
        let (status, body) = self
            .pages
            .lock()
            .unwrap()
            .get(request.url.as_str())
            .cloned()
            .unwrap_or((404, Bytes::new()));
        Ok(FetchedResponse {
            status,
            content_type: Some("text/html; charset=utf-8".into()),
            body,
        })
    }
}
