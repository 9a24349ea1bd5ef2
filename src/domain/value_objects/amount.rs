use serde::{Deserialize, Serialize};
use std::fmt;

/// 金額（最小通貨単位＝コボ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    pub fn from_minor(value: i64) -> Result<Self, String> {
        if value <= 0 {
            return Err("Amount must be greater than zero".to_string());
        }
        Ok(Self(value))
    }

    pub fn from_naira(naira: i64) -> Result<Self, String> {
        let minor = naira
            .checked_mul(100)
            .ok_or_else(|| "Amount is out of range".to_string())?;
        Self::from_minor(minor)
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NGN {}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl TryFrom<i64> for Amount {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_minor(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naira_converts_to_kobo() {
        let amount = Amount::from_naira(50_000).unwrap();
        assert_eq!(amount.minor_units(), 5_000_000);
        assert_eq!(amount.to_string(), "NGN 50000.00");
    }

    #[test]
    fn rejects_zero_and_negative() {
        assert!(Amount::from_minor(0).is_err());
        assert!(Amount::from_minor(-1).is_err());
        assert!(Amount::from_naira(i64::MAX).is_err());
    }
}
