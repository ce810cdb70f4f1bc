//! Coordinator configuration
//!
//! Loaded from a JSON file, CLI flags, or built in code. Every field has a
//! default so an empty object is a valid configuration. Validation is done
//! via `garde::Validate`.

use crate::defaults::{
    default_acquire_timeout_seconds, default_allow_fallback, default_busy_timeout_ms,
    default_creation_timeout_minutes, default_expiry_hours, default_poll_interval_seconds,
};
use crate::error::ConfigError;
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tuning knobs for lease acquisition, expiry and storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LeaseConfig {
    /// Hours a ready cluster stays reusable (advisory; enforced by the sweep)
    #[serde(default = "default_expiry_hours")]
    #[garde(range(min = 1))]
    pub default_expiry_hours: u64,

    /// Seconds between registry polls while another process creates
    #[serde(default = "default_poll_interval_seconds")]
    #[garde(range(min = 1))]
    pub poll_interval_seconds: u64,

    /// Seconds to wait for another process's creation
    #[serde(default = "default_acquire_timeout_seconds")]
    #[garde(range(min = 1))]
    pub acquire_timeout_seconds: u64,

    /// Create a private cluster when joining fails or times out
    #[serde(default = "default_allow_fallback")]
    #[garde(skip)]
    pub allow_fallback: bool,

    /// Minutes after which a `creating` record is considered abandoned
    #[serde(default = "default_creation_timeout_minutes")]
    #[garde(range(min = 1))]
    pub creation_timeout_minutes: u64,

    /// SQLite busy timeout in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    #[garde(range(min = 1))]
    pub busy_timeout_ms: u64,

    /// Registry database path (default: platform data dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub db_path: Option<PathBuf>,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            default_expiry_hours: default_expiry_hours(),
            poll_interval_seconds: default_poll_interval_seconds(),
            acquire_timeout_seconds: default_acquire_timeout_seconds(),
            allow_fallback: default_allow_fallback(),
            creation_timeout_minutes: default_creation_timeout_minutes(),
            busy_timeout_ms: default_busy_timeout_ms(),
            db_path: None,
        }
    }
}

impl LeaseConfig {
    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::io(path.display().to_string(), e))?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.default_expiry_hours * 3600)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }

    pub fn creation_timeout(&self) -> Duration {
        Duration::from_secs(self.creation_timeout_minutes * 60)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
