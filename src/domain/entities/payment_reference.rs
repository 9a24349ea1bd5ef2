use crate::domain::entities::lifecycle::{ConfirmationOutcome, PaymentReferenceStatus};
use crate::domain::value_objects::{GatewayStatusCode, IdempotencyKey, ReferenceCode};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable proof that the gateway accepted a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReference {
    pub reference_code: ReferenceCode,
    pub idempotency_key: IdempotencyKey,
    pub status: PaymentReferenceStatus,
    pub gateway_status_code: Option<GatewayStatusCode>,
    pub payment_url: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl PaymentReference {
    pub fn issued(
        reference_code: ReferenceCode,
        idempotency_key: IdempotencyKey,
        gateway_status_code: Option<GatewayStatusCode>,
        payment_url: Option<String>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            reference_code,
            idempotency_key,
            status: PaymentReferenceStatus::Initiated,
            gateway_status_code,
            payment_url,
            issued_at,
            confirmed_at: None,
        }
    }

    pub fn record_outcome(
        &mut self,
        outcome: ConfirmationOutcome,
        code: GatewayStatusCode,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let next = self.status.apply(outcome)?;
        if next.is_terminal() {
            self.confirmed_at = Some(now);
        }
        self.status = next;
        self.gateway_status_code = Some(code);
        Ok(())
    }
}
