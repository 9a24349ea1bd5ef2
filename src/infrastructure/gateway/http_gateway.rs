use crate::application::ports::payment_gateway::{
    GatewayError, InitializationRequest, IssuedReference, PaymentGateway, ReferenceStatusReport,
};
use crate::domain::value_objects::{GatewayStatusCode, ReferenceCode};
use crate::shared::config::GatewayConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize)]
struct InitializationBody {
    #[serde(alias = "RRR", alias = "referenceCode")]
    rrr: Option<String>,
    #[serde(alias = "statuscode", alias = "statusCode")]
    status: Option<String>,
    #[serde(rename = "paymentUrl")]
    payment_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    #[serde(alias = "RRR", alias = "referenceCode")]
    rrr: Option<String>,
    #[serde(alias = "statuscode", alias = "statusCode")]
    status: Option<String>,
}

/// HTTP client for the payment gateway's initialization and status endpoints.
pub struct HttpPaymentGateway {
    client: Client,
    base_url: Url,
}

impl HttpPaymentGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;
        Self::with_client(client, &config.base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, AppError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.base_url
            .join(path)
            .map_err(|err| GatewayError::Protocol(format!("invalid endpoint {path}: {err}")))
    }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(err.to_string())
    }
}

/// Maps an initialization response to an issued reference.
///
/// A reference code is the only success criterion; `paymentUrl` is optional.
fn parse_initialization(status: StatusCode, body: &str) -> Result<IssuedReference, GatewayError> {
    if let Some(err) = GatewayError::from_status(status.as_u16(), truncate(body)) {
        return Err(err);
    }

    let parsed: InitializationBody = serde_json::from_str(body)
        .map_err(|err| GatewayError::Protocol(format!("initialization body: {err}")))?;

    let reference_code = parsed
        .rrr
        .and_then(|code| ReferenceCode::new(code).ok())
        .ok_or_else(|| GatewayError::Protocol("response carries no reference code".to_string()))?;

    Ok(IssuedReference {
        reference_code,
        status_code: parsed.status.map(GatewayStatusCode::new),
        payment_url: parsed.payment_url.filter(|url| !url.trim().is_empty()),
    })
}

fn parse_status(
    reference_code: &ReferenceCode,
    status: StatusCode,
    body: &str,
) -> Result<ReferenceStatusReport, GatewayError> {
    if let Some(err) = GatewayError::from_status(status.as_u16(), truncate(body)) {
        return Err(err);
    }

    let parsed: StatusBody = serde_json::from_str(body)
        .map_err(|err| GatewayError::Protocol(format!("status body: {err}")))?;

    if let Some(echoed) = parsed.rrr.as_deref() {
        if echoed.trim() != reference_code.as_str() {
            return Err(GatewayError::Protocol(format!(
                "status for {echoed} returned while polling {reference_code}"
            )));
        }
    }

    let status_code = parsed
        .status
        .ok_or_else(|| GatewayError::Protocol("status response carries no status".to_string()))?;

    Ok(ReferenceStatusReport {
        reference_code: reference_code.clone(),
        status_code: GatewayStatusCode::new(status_code),
    })
}

fn truncate(body: &str) -> String {
    body.chars().take(256).collect()
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn initialize(
        &self,
        request: &InitializationRequest,
    ) -> Result<IssuedReference, GatewayError> {
        let url = self.endpoint("payments/init")?;
        let response = self
            .client
            .post(url)
            .header("Idempotency-Key", request.idempotency_key.as_str())
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        parse_initialization(status, &body)
    }

    async fn confirm(
        &self,
        reference_code: &ReferenceCode,
    ) -> Result<ReferenceStatusReport, GatewayError> {
        let url = self.endpoint(&format!("payments/{}/status", reference_code.as_str()))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        parse_status(reference_code, status, &body)
    }
}
