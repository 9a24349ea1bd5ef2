use crate::application::ports::network_fetcher::NetworkFetcher;
use crate::domain::entities::{CacheRequest, FetchedResponse};
use crate::shared::error::AppError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use std::time::Duration;

pub struct HttpNetworkFetcher {
    client: Client,
}

impl HttpNetworkFetcher {
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NetworkFetcher for HttpNetworkFetcher {
    async fn fetch(&self, request: &CacheRequest) -> Result<FetchedResponse, AppError> {
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|err| AppError::InvalidInput(format!("invalid method: {err}")))?;

        let response = self
            .client
            .request(method, request.url.clone())
            .send()
            .await
            .map_err(|err| AppError::Network(format!("{} failed: {err}", request.url)))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|err| AppError::Network(format!("{} body failed: {err}", request.url)))?;

        Ok(FetchedResponse {
            status,
            content_type,
            body,
        })
    }
}
