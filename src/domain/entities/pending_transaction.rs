use crate::domain::entities::lifecycle::{LifecycleEvent, TransactionState};
use crate::domain::value_objects::{
    Amount, CollectorId, GeoPoint, IdempotencyKey, PayerIdentity, RevenueCode,
};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 収納員が確定した入金内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub payer: PayerIdentity,
    pub amount: Amount,
    pub revenue_code: RevenueCode,
    pub collector_id: CollectorId,
    pub location: Option<GeoPoint>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    pub idempotency_key: IdempotencyKey,
    pub payload: PaymentPayload,
    pub state: TransactionState,
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub needs_review: bool,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl PendingTransaction {
    pub fn new(idempotency_key: IdempotencyKey, payload: PaymentPayload) -> Self {
        let updated_at = payload.captured_at;
        Self {
            idempotency_key,
            payload,
            state: TransactionState::Queued,
            attempt_count: 0,
            last_attempt_at: None,
            next_attempt_at: None,
            needs_review: false,
            last_error: None,
            updated_at,
        }
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.payload.captured_at
    }

    /// Applies a lifecycle event, leaving the record untouched when the
    /// transition is not allowed.
    pub fn apply(&mut self, event: LifecycleEvent, now: DateTime<Utc>) -> Result<(), AppError> {
        let next = self.state.transition(event).map_err(|err| match err {
            AppError::InvalidTransition(msg) => {
                AppError::InvalidTransition(format!("{}: {msg}", self.idempotency_key))
            }
            other => other,
        })?;

        if event == LifecycleEvent::SubmitStarted {
            self.attempt_count = self.attempt_count.saturating_add(1);
            self.last_attempt_at = Some(now);
            self.next_attempt_at = None;
        }
        self.state = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.map(|at| at <= now).unwrap_or(true)
    }

    pub fn is_pending(&self) -> bool {
        !self.state.is_terminal()
    }
}
