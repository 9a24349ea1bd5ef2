//! Table-driven classification of gateway status codes.
//!
//! Codes that are not in the table are never treated as failures: they map to
//! [`ConfirmationOutcome::StillPending`] and are reported as unknown so they can
//! be classified explicitly.

use crate::domain::entities::ConfirmationOutcome;
use crate::domain::value_objects::GatewayStatusCode;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub outcome: ConfirmationOutcome,
    pub known: bool,
}

#[derive(Debug, Clone)]
pub struct GatewayStatusTable {
    entries: HashMap<String, ConfirmationOutcome>,
}

const CONFIRMED_CODES: &[&str] = &["00", "01", "confirmed", "successful", "paid"];
const FAILED_CODES: &[&str] = &["02", "012", "030", "031", "failed", "declined", "cancelled"];
const PENDING_CODES: &[&str] = &["020", "021", "025", "040", "pending", "initiated"];

impl GatewayStatusTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn with(mut self, code: &str, outcome: ConfirmationOutcome) -> Self {
        self.entries.insert(normalize(code), outcome);
        self
    }

    pub fn classify(&self, code: &GatewayStatusCode) -> Classification {
        match self.entries.get(&normalize(code.as_str())) {
            Some(outcome) => Classification {
                outcome: *outcome,
                known: true,
            },
            None => Classification {
                outcome: ConfirmationOutcome::StillPending,
                known: false,
            },
        }
    }
}

impl Default for GatewayStatusTable {
    fn default() -> Self {
        let mut table = Self::new();
        for code in CONFIRMED_CODES {
            table = table.with(code, ConfirmationOutcome::Confirmed);
        }
        for code in FAILED_CODES {
            table = table.with(code, ConfirmationOutcome::Failed);
        }
        for code in PENDING_CODES {
            table = table.with(code, ConfirmationOutcome::StillPending);
        }
        table
    }
}

fn normalize(code: &str) -> String {
    code.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_map_to_outcomes() {
        let table = GatewayStatusTable::default();
        let classify = |code: &str| table.classify(&GatewayStatusCode::new(code));

        assert_eq!(classify("00").outcome, ConfirmationOutcome::Confirmed);
        assert_eq!(classify("Confirmed").outcome, ConfirmationOutcome::Confirmed);
        assert_eq!(classify("02").outcome, ConfirmationOutcome::Failed);
        assert_eq!(classify("021").outcome, ConfirmationOutcome::StillPending);
        assert!(classify("021").known);
    }

    #[test]
    fn unknown_codes_stay_pending() {
        let table = GatewayStatusTable::default();
        let result = table.classify(&GatewayStatusCode::new("777"));
        assert_eq!(result.outcome, ConfirmationOutcome::StillPending);
        assert!(!result.known);
    }

    #[test]
    fn overrides_replace_defaults() {
        let table = GatewayStatusTable::default().with("777", ConfirmationOutcome::Failed);
        assert_eq!(
            table.classify(&GatewayStatusCode::new("777")).outcome,
            ConfirmationOutcome::Failed
        );
    }
}
