//! Offline-first capture and reconciliation of field payment collections.
//!
//! Captures are written to a local SQLite queue before anything touches the
//! network, then driven through the payment gateway by the reconciler once
//! the backend is reachable again.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use shared::{AppConfig, AppError, Result};

/// Installs the global subscriber. `RUST_LOG` overrides `default_filter`.
pub fn init_logging(default_filter: &str, json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = if json {
        fmt::layer().json().with_current_span(false).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    // テストなどで二重に初期化されても落とさない
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

pub const DEFAULT_LOG_FILTER: &str = "sync=debug,collector_sync=debug,info";
