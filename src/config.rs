//! # Engine Configuration
//!
//! Explicit, validated configuration for the orchestration engine. Values are
//! layered: compiled defaults, then an optional `liftoff.toml`, then
//! `LIFTOFF_`-prefixed environment variables (e.g. `LIFTOFF_LOCK_TTL_SECONDS`).
//! No silent fallbacks beyond the documented defaults.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// TTL for the per-release cron lock. A tick that outlives this lease
    /// loses exclusivity; the conditional updates on tasks and uploads are
    /// the backstop for that window.
    pub lock_ttl_seconds: u64,
    /// Minimum pass percentage for a regression test run to count as passed.
    pub test_pass_threshold: f64,
    /// Bind address for the HTTP surface when the host serves the router.
    pub bind_address: String,
    /// Directory where manually uploaded build artifacts are staged.
    pub artifact_dir: String,
    /// Chat channel used for stage-boundary notifications.
    pub notification_channel: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_ttl_seconds: 300,
            test_pass_threshold: 80.0,
            bind_address: "0.0.0.0:8080".to_string(),
            artifact_dir: "artifacts".to_string(),
            notification_channel: "#releases".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from defaults, optional `liftoff.toml`, and
    /// `LIFTOFF_`-prefixed environment variables, in that precedence order.
    pub fn load() -> Result<Self> {
        let defaults = Self::default();
        let builder = config::Config::builder()
            .set_default("lock_ttl_seconds", defaults.lock_ttl_seconds)
            .map_err(|e| EngineError::Configuration(e.to_string()))?
            .set_default("test_pass_threshold", defaults.test_pass_threshold)
            .map_err(|e| EngineError::Configuration(e.to_string()))?
            .set_default("bind_address", defaults.bind_address.clone())
            .map_err(|e| EngineError::Configuration(e.to_string()))?
            .set_default("artifact_dir", defaults.artifact_dir.clone())
            .map_err(|e| EngineError::Configuration(e.to_string()))?
            .set_default("notification_channel", defaults.notification_channel.clone())
            .map_err(|e| EngineError::Configuration(e.to_string()))?
            .add_source(config::File::with_name("liftoff").required(false))
            .add_source(config::Environment::with_prefix("LIFTOFF"));

        let loaded: Self = builder
            .build()
            .map_err(|e| EngineError::Configuration(e.to_string()))?
            .try_deserialize()
            .map_err(|e| EngineError::Configuration(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.lock_ttl_seconds == 0 {
            return Err(EngineError::Configuration(
                "lock_ttl_seconds must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.test_pass_threshold) {
            return Err(EngineError::Configuration(format!(
                "test_pass_threshold must be within 0..=100, got {}",
                self.test_pass_threshold
            )));
        }
        Ok(())
    }
}
