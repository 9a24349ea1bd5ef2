use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayerIdentity {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl PayerIdentity {
    pub fn new(
        name: String,
        phone: Option<String>,
        email: Option<String>,
    ) -> Result<Self, String> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err("Payer name cannot be empty".to_string());
        }
        if let Some(email) = &email {
            if !email.contains('@') {
                return Err(format!("Invalid payer email: {email}"));
            }
        }
        Ok(Self {
            name,
            phone: phone.filter(|p| !p.trim().is_empty()),
            email,
        })
    }
}

/// 入金記録時の位置情報
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: Option<f64>,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64, accuracy_m: Option<f64>) -> Result<Self, String> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(format!("Latitude out of range: {latitude}"));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(format!("Longitude out of range: {longitude}"));
        }
        if let Some(accuracy) = accuracy_m {
            if accuracy.is_sign_negative() || accuracy.is_nan() {
                return Err(format!("Invalid location accuracy: {accuracy}"));
            }
        }
        Ok(Self {
            latitude,
            longitude,
            accuracy_m,
        })
    }
}
