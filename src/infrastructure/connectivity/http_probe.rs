use crate::application::ports::reachability::ReachabilityProbe;
use crate::shared::config::ConnectivityConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Any HTTP answer from the probe URL counts as reachable; only transport
/// failures mean the link is down.
pub struct HttpReachabilityProbe {
    client: Client,
    url: String,
}

impl HttpReachabilityProbe {
    pub fn new(config: &ConnectivityConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.probe_timeout))
            .build()?;
        Ok(Self {
            client,
            url: config.probe_url.clone(),
        })
    }
}

#[async_trait]
impl ReachabilityProbe for HttpReachabilityProbe {
    async fn probe(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(response) => {
                tracing::trace!(
                    target: "sync::connectivity",
                    status = %response.status(),
                    "reachability probe answered"
                );
                true
            }
            Err(err) => {
                tracing::debug!(
                    target: "sync::connectivity",
                    error = %err,
                    url = %self.url,
                    "reachability probe failed"
                );
                false
            }
        }
    }
}
