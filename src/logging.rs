//! # Structured Logging
//!
//! Environment-aware tracing initialization. Output is console-only; the
//! filter comes from `RUST_LOG` with a per-environment default so test runs
//! stay quiet and development ticks are visible.

use std::env;
use std::sync::OnceLock;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging. Safe to call more than once; only the
/// first call installs a subscriber.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = detect_environment();
        let default_level = match environment.as_str() {
            "production" => "info",
            "test" => "warn",
            _ => "debug",
        };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("liftoff_core={default_level}")));

        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_filter(filter),
        );

        // A host application may already have installed a global subscriber.
        if subscriber.try_init().is_err() {
            tracing::debug!("global tracing subscriber already installed, reusing it");
        }
    });
}

fn detect_environment() -> String {
    env::var("LIFTOFF_ENV").unwrap_or_else(|_| "development".to_string())
}
