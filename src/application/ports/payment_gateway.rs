use crate::domain::value_objects::{
    Amount, CollectorId, GatewayStatusCode, IdempotencyKey, PayerIdentity, ReferenceCode,
    RevenueCode,
};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializationRequest {
    pub idempotency_key: IdempotencyKey,
    pub amount: Amount,
    pub payer: PayerIdentity,
    pub revenue_code: RevenueCode,
    pub collector_id: CollectorId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedReference {
    pub reference_code: ReferenceCode,
    pub status_code: Option<GatewayStatusCode>,
    pub payment_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceStatusReport {
    pub reference_code: ReferenceCode,
    pub status_code: GatewayStatusCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("gateway call timed out")]
    Timeout,

    #[error("gateway returned server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected gateway response: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// Everything except an explicit 4xx rejection may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Transport(_)
            | GatewayError::Timeout
            | GatewayError::Server { .. }
            | GatewayError::Protocol(_) => true,
            GatewayError::Rejected { .. } => false,
        }
    }

    pub fn from_status(status: u16, message: String) -> Option<Self> {
        match status {
            400..=499 => Some(GatewayError::Rejected { status, message }),
            500..=599 => Some(GatewayError::Server { status, message }),
            _ => None,
        }
    }
}

impl From<GatewayError> for crate::shared::error::AppError {
    fn from(err: GatewayError) -> Self {
        crate::shared::error::AppError::Gateway(err.to_string())
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Asks the gateway to allocate a reference for this idempotency key.
    async fn initialize(
        &self,
        request: &InitializationRequest,
    ) -> Result<IssuedReference, GatewayError>;

    async fn confirm(
        &self,
        reference_code: &ReferenceCode,
    ) -> Result<ReferenceStatusReport, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes_are_distinguishable() {
        let rejected = GatewayError::from_status(422, "bad amount".into()).unwrap();
        let server = GatewayError::from_status(503, "busy".into()).unwrap();
        assert!(!rejected.is_transient());
        assert!(server.is_transient());
        assert!(GatewayError::from_status(200, String::new()).is_none());
        assert!(GatewayError::Timeout.is_transient());
    }
}
