use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// キャッシュのキー（メソッド＋URL）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(method: &str, url: &Url) -> Result<Self, String> {
        let method = method.trim().to_ascii_uppercase();
        if method.is_empty() {
            return Err("Request method cannot be empty".to_string());
        }
        let mut url = url.clone();
        url.set_fragment(None);
        Ok(Self(format!("{method} {url}")))
    }

    pub fn from_stored(value: String) -> Result<Self, String> {
        match value.split_once(' ') {
            Some((method, url)) if !method.is_empty() && !url.is_empty() => Ok(Self(value)),
            _ => Err(format!("Malformed request key: {value}")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
