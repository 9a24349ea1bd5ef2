use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub sync: SyncConfig,
    pub connectivity: ConnectivityConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    /// 初期化・確認リクエストのタイムアウト（秒）
    pub request_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
    pub sync_interval: u64,
    pub max_attempts: u32,
    pub max_workers: usize,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    pub probe_url: String,
    pub probe_timeout: u64,
    pub poll_interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub origin: String,
    pub generation: String,
    pub manifest: Vec<String>,
    pub offline_fallback: String,
    pub fetch_timeout: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: default_database_url(),
                max_connections: 5,
                connection_timeout: 30,
            },
            gateway: GatewayConfig {
                base_url: "http://localhost:8787".to_string(),
                request_timeout: 15,
            },
            sync: SyncConfig {
                auto_sync: true,
                sync_interval: 60,
                max_attempts: 5,
                max_workers: 4,
                backoff_base_ms: 2_000,
                backoff_cap_ms: 300_000, // 5 minutes
            },
            connectivity: ConnectivityConfig {
                probe_url: "http://localhost:8787/health".to_string(),
                probe_timeout: 5,
                poll_interval: 30,
            },
            cache: CacheConfig {
                origin: "http://localhost:3000".to_string(),
                generation: "collector-shell-v1".to_string(),
                manifest: vec![
                    "/".to_string(),
                    "/index.html".to_string(),
                    "/offline.html".to_string(),
                    "/manifest.json".to_string(),
                ],
                offline_fallback: "/offline.html".to_string(),
                fetch_timeout: 10,
            },
        }
    }
}

impl SyncConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        // 既定値
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("COLLECTOR_DATABASE_URL") {
            if !v.trim().is_empty() {
                cfg.database.url = v.trim().to_string();
            }
        }
        if let Some(value) = env_u64("COLLECTOR_DATABASE_MAX_CONNECTIONS") {
            cfg.database.max_connections = value as u32;
        }

        // ゲートウェイ設定
        if let Ok(v) = std::env::var("COLLECTOR_GATEWAY_URL") {
            if !v.trim().is_empty() {
                cfg.gateway.base_url = v.trim().to_string();
            }
        }
        if let Some(value) = env_u64("COLLECTOR_GATEWAY_TIMEOUT_SECS") {
            cfg.gateway.request_timeout = value.max(1);
        }

        // 同期設定
        if let Ok(v) = std::env::var("COLLECTOR_AUTO_SYNC") {
            cfg.sync.auto_sync = parse_bool(&v, cfg.sync.auto_sync);
        }
        if let Some(value) = env_u64("COLLECTOR_SYNC_INTERVAL_SECS") {
            cfg.sync.sync_interval = value.max(1);
        }
        if let Some(value) = env_u64("COLLECTOR_SYNC_MAX_ATTEMPTS") {
            cfg.sync.max_attempts = value as u32;
        }
        if let Some(value) = env_u64("COLLECTOR_SYNC_MAX_WORKERS") {
            cfg.sync.max_workers = value as usize;
        }
        if let Some(value) = env_u64("COLLECTOR_SYNC_BACKOFF_BASE_MS") {
            cfg.sync.backoff_base_ms = value;
        }
        if let Some(value) = env_u64("COLLECTOR_SYNC_BACKOFF_CAP_MS") {
            cfg.sync.backoff_cap_ms = value;
        }

        if let Ok(v) = std::env::var("COLLECTOR_PROBE_URL") {
            if !v.trim().is_empty() {
                cfg.connectivity.probe_url = v.trim().to_string();
            }
        }
        if let Some(value) = env_u64("COLLECTOR_PROBE_TIMEOUT_SECS") {
            cfg.connectivity.probe_timeout = value.max(1);
        }
        if let Some(value) = env_u64("COLLECTOR_PROBE_POLL_SECS") {
            cfg.connectivity.poll_interval = value.max(1);
        }

        // キャッシュ設定
        if let Ok(v) = std::env::var("COLLECTOR_CACHE_ORIGIN") {
            if !v.trim().is_empty() {
                cfg.cache.origin = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("COLLECTOR_CACHE_GENERATION") {
            if !v.trim().is_empty() {
                cfg.cache.generation = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("COLLECTOR_CACHE_MANIFEST") {
            let entries: Vec<String> = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !entries.is_empty() {
                cfg.cache.manifest = entries;
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.sync.max_attempts == 0 {
            return Err("Sync max_attempts must be greater than 0".to_string());
        }
        if self.sync.max_workers == 0 {
            return Err("Sync max_workers must be greater than 0".to_string());
        }
        if self.sync.backoff_base_ms == 0 {
            return Err("Sync backoff_base_ms must be greater than 0".to_string());
        }
        if self.sync.backoff_cap_ms < self.sync.backoff_base_ms {
            return Err("Sync backoff_cap_ms must not be lower than backoff_base_ms".to_string());
        }
        if self.cache.manifest.is_empty() {
            return Err("Cache manifest must list at least one entry".to_string());
        }
        if !self.cache.manifest.contains(&self.cache.offline_fallback) {
            return Err("Cache offline_fallback must be part of the manifest".to_string());
        }
        for (name, value) in [
            ("gateway.base_url", &self.gateway.base_url),
            ("connectivity.probe_url", &self.connectivity.probe_url),
            ("cache.origin", &self.cache.origin),
        ] {
            validate_http_url(name, value)?;
        }
        Ok(())
    }
}

fn default_database_url() -> String {
    dirs::data_local_dir()
        .map(|dir| dir.join("collector-sync").join("collector.db"))
        .map(|path| format!("sqlite://{}", path.display()))
        .unwrap_or_else(|| "sqlite:data/collector.db".to_string())
}

fn validate_http_url(name: &str, value: &str) -> Result<(), String> {
    let url = Url::parse(value).map_err(|err| format!("{name} is not a valid URL: {err}"))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("{name} must use http or https, got {other}")),
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| parse_u64(&v))
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}
