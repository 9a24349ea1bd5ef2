use async_trait::async_trait;
use collector_sync::application::ports::{
    GatewayError, InitializationRequest, IssuedReference, PaymentGateway, ReferenceStatusReport,
};
use collector_sync::domain::value_objects::{GatewayStatusCode, IdempotencyKey, ReferenceCode};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// What the next initialize call should do instead of answering normally.
#[derive(Debug, Clone)]
pub enum Scripted {
    Fail(GatewayError),
    /// The gateway allocates the reference but the response never arrives.
    LoseResponse,
    /// The call never completes.
    Hang,
}

#[derive(Default)]
struct GatewayState {
    issued: HashMap<IdempotencyKey, ReferenceCode>,
    next_reference: u32,
    initialize_calls: HashMap<IdempotencyKey, u32>,
    script: VecDeque<Scripted>,
    always: Option<GatewayError>,
    statuses: HashMap<String, GatewayStatusCode>,
    confirm_error: Option<GatewayError>,
    confirm_calls: u32,
}

/// Gateway stub that deduplicates by idempotency key like the real one.
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<GatewayState>,
}

impl MockGateway {
    pub fn script(&self, step: Scripted) {
        self.state.lock().unwrap().script.push_back(step);
    }

    pub fn fail_always(&self, error: Option<GatewayError>) {
        self.state.lock().unwrap().always = error;
    }

    pub fn set_status(&self, reference: &str, code: &str) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(reference.to_string(), GatewayStatusCode::new(code));
    }

    pub fn fail_confirmations(&self, error: Option<GatewayError>) {
        self.state.lock().unwrap().confirm_error = error;
    }

    pub fn initialize_calls(&self, key: &IdempotencyKey) -> u32 {
        self.state
            .lock()
            .unwrap()
            .initialize_calls
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_initialize_calls(&self) -> u32 {
        self.state.lock().unwrap().initialize_calls.values().sum()
    }

    pub fn confirm_calls(&self) -> u32 {
        self.state.lock().unwrap().confirm_calls
    }

    pub fn issued_count(&self) -> usize {
        self.state.lock().unwrap().issued.len()
    }

    pub fn reference_for(&self, key: &IdempotencyKey) -> Option<ReferenceCode> {
        self.state.lock().unwrap().issued.get(key).cloned()
    }
}

impl GatewayState {
    fn issue(&mut self, key: &IdempotencyKey) -> ReferenceCode {
        if let Some(existing) = self.issued.get(key) {
            return existing.clone();
        }
        self.next_reference += 1;
        let code = ReferenceCode::new(format!("RRR-{}", self.next_reference)).unwrap();
        self.issued.insert(key.clone(), code.clone());
        code
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn initialize(
        &self,
        request: &InitializationRequest,
    ) -> Result<IssuedReference, GatewayError> {
        let hang = {
            let mut state = self.state.lock().unwrap();
            *state
                .initialize_calls
                .entry(request.idempotency_key.clone())
                .or_default() += 1;
            state.always.is_none()
                && matches!(state.script.front(), Some(Scripted::Hang))
                && state.script.pop_front().is_some()
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.always.clone() {
            return Err(error);
        }

        match state.script.pop_front() {
            Some(Scripted::Fail(error)) => Err(error),
            Some(Scripted::Hang) => unreachable!("hang steps are consumed above"),
            Some(Scripted::LoseResponse) => {
                state.issue(&request.idempotency_key);
                Err(GatewayError::Timeout)
            }
            None => {
                let reference_code = state.issue(&request.idempotency_key);
                Ok(IssuedReference {
                    reference_code,
                    status_code: Some(GatewayStatusCode::new("025")),
                    payment_url: None,
                })
            }
        }
    }

    async fn confirm(
        &self,
        reference_code: &ReferenceCode,
    ) -> Result<ReferenceStatusReport, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.confirm_calls += 1;

        if let Some(error) = state.confirm_error.clone() {
            return Err(error);
        }
        let status_code = state
            .statuses
            .get(reference_code.as_str())
            .cloned()
            .unwrap_or_else(|| GatewayStatusCode::new("021"));
        Ok(ReferenceStatusReport {
            reference_code: reference_code.clone(),
            status_code,
        })
    }
}
