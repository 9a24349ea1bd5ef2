//! Per-transaction lifecycle and payment reference status.
//!
//! Every transition lives in [`TransactionState::transition`]; callers never
//! assign a state directly. Terminal states reject every event, so a resolved
//! transaction can never move back into the queue.

use crate::shared::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Queued,
    Submitting,
    AwaitingConfirmation,
    Resolved(Resolution),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// 初期化リクエストの送信開始
    SubmitStarted,
    /// ゲートウェイが参照番号を発行した
    ReferenceIssued,
    /// タイムアウト・接続断・5xx
    TransientFailure,
    /// 4xx（ペイロード不正）
    Rejected,
    Confirmed,
    Declined,
    /// 送信中にプロセスが落ちた記録の復旧
    Interrupted,
    /// 保存済みの参照番号が読めず隔離された
    ReferenceLost,
}

impl TransactionState {
    pub fn transition(self, event: LifecycleEvent) -> Result<TransactionState, AppError> {
        use LifecycleEvent as E;
        use TransactionState as S;

        let next = match (self, event) {
            (S::Queued, E::SubmitStarted) => Some(S::Submitting),
            (S::Queued, _) => None,
            (S::Submitting, E::ReferenceIssued) => Some(S::AwaitingConfirmation),
            (S::Submitting, E::TransientFailure) | (S::Submitting, E::Interrupted) => {
                Some(S::Queued)
            }
            (S::Submitting, E::Rejected) => Some(S::Resolved(Resolution::Failed)),
            (S::Submitting, _) => None,
            (S::AwaitingConfirmation, E::Confirmed) => Some(S::Resolved(Resolution::Confirmed)),
            (S::AwaitingConfirmation, E::Declined) => Some(S::Resolved(Resolution::Failed)),
            (S::AwaitingConfirmation, E::ReferenceLost) => Some(S::Queued),
            (S::AwaitingConfirmation, _) => None,
            (S::Resolved(_), _) => None,
        };

        next.ok_or_else(|| {
            AppError::invalid_transition(format!("{self} does not accept {event:?}"))
        })
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            TransactionState::Resolved(_) => true,
            TransactionState::Queued
            | TransactionState::Submitting
            | TransactionState::AwaitingConfirmation => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Queued => "queued",
            TransactionState::Submitting => "submitting",
            TransactionState::AwaitingConfirmation => "awaiting_confirmation",
            TransactionState::Resolved(Resolution::Confirmed) => "resolved_confirmed",
            TransactionState::Resolved(Resolution::Failed) => "resolved_failed",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentReferenceStatus {
    Initiated,
    PendingConfirmation,
    Confirmed,
    Failed,
}

/// Outcome of classifying a gateway status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Confirmed,
    Failed,
    StillPending,
}

impl PaymentReferenceStatus {
    pub fn apply(self, outcome: ConfirmationOutcome) -> Result<PaymentReferenceStatus, AppError> {
        use ConfirmationOutcome as O;
        use PaymentReferenceStatus as P;

        match (self, outcome) {
            (P::Initiated | P::PendingConfirmation, O::Confirmed) => Ok(P::Confirmed),
            (P::Initiated | P::PendingConfirmation, O::Failed) => Ok(P::Failed),
            (P::Initiated | P::PendingConfirmation, O::StillPending) => {
                Ok(P::PendingConfirmation)
            }
            (P::Confirmed | P::Failed, _) => Err(AppError::invalid_transition(format!(
                "payment reference already {}",
                self.as_str()
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            PaymentReferenceStatus::Confirmed | PaymentReferenceStatus::Failed => true,
            PaymentReferenceStatus::Initiated | PaymentReferenceStatus::PendingConfirmation => {
                false
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentReferenceStatus::Initiated => "initiated",
            PaymentReferenceStatus::PendingConfirmation => "pending_confirmation",
            PaymentReferenceStatus::Confirmed => "confirmed",
            PaymentReferenceStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "initiated" => Ok(PaymentReferenceStatus::Initiated),
            "pending_confirmation" => Ok(PaymentReferenceStatus::PendingConfirmation),
            "confirmed" => Ok(PaymentReferenceStatus::Confirmed),
            "failed" => Ok(PaymentReferenceStatus::Failed),
            other => Err(format!("Unknown payment reference status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_EVENTS: [LifecycleEvent; 8] = [
        LifecycleEvent::SubmitStarted,
        LifecycleEvent::ReferenceIssued,
        LifecycleEvent::TransientFailure,
        LifecycleEvent::Rejected,
        LifecycleEvent::Confirmed,
        LifecycleEvent::Declined,
        LifecycleEvent::Interrupted,
        LifecycleEvent::ReferenceLost,
    ];

    #[test]
    fn happy_path_reaches_confirmed() {
        let state = TransactionState::Queued
            .transition(LifecycleEvent::SubmitStarted)
            .and_then(|s| s.transition(LifecycleEvent::ReferenceIssued))
            .and_then(|s| s.transition(LifecycleEvent::Confirmed))
            .unwrap();
        assert_eq!(state, TransactionState::Resolved(Resolution::Confirmed));
        assert!(state.is_terminal());
    }

    #[test]
    fn transient_failure_returns_to_queue() {
        let state = TransactionState::Submitting
            .transition(LifecycleEvent::TransientFailure)
            .unwrap();
        assert_eq!(state, TransactionState::Queued);
    }

    #[test]
    fn rejection_is_terminal_failure() {
        let state = TransactionState::Submitting
            .transition(LifecycleEvent::Rejected)
            .unwrap();
        assert_eq!(state, TransactionState::Resolved(Resolution::Failed));
    }

    #[test]
    fn resolved_states_reject_every_event() {
        for resolution in [Resolution::Confirmed, Resolution::Failed] {
            for event in ALL_EVENTS {
                let result = TransactionState::Resolved(resolution).transition(event);
                assert!(
                    matches!(result, Err(AppError::InvalidTransition(_))),
                    "{resolution:?} accepted {event:?}"
                );
            }
        }
    }

    #[test]
    fn queued_only_accepts_submit() {
        for event in ALL_EVENTS {
            let result = TransactionState::Queued.transition(event);
            assert_eq!(result.is_ok(), event == LifecycleEvent::SubmitStarted);
        }
    }

    #[test]
    fn lost_reference_requeues_awaiting_record() {
        let state = TransactionState::AwaitingConfirmation
            .transition(LifecycleEvent::ReferenceLost)
            .unwrap();
        assert_eq!(state, TransactionState::Queued);
        assert!(TransactionState::Submitting
            .transition(LifecycleEvent::ReferenceLost)
            .is_err());
    }

    #[test]
    fn reference_status_progression() {
        let status = PaymentReferenceStatus::Initiated
            .apply(ConfirmationOutcome::StillPending)
            .unwrap();
        assert_eq!(status, PaymentReferenceStatus::PendingConfirmation);
        let status = status.apply(ConfirmationOutcome::Confirmed).unwrap();
        assert!(status.is_terminal());
        assert!(status.apply(ConfirmationOutcome::Failed).is_err());
    }

    #[test]
    fn state_serializes_with_resolution() {
        let json = serde_json::to_string(&TransactionState::Resolved(Resolution::Failed)).unwrap();
        assert_eq!(json, r#"{"resolved":"failed"}"#);
        let back: TransactionState = serde_json::from_str(r#""awaiting_confirmation""#).unwrap();
        assert_eq!(back, TransactionState::AwaitingConfirmation);
    }
}
