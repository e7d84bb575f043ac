//! Global configuration settings
//!
//! Process-wide settings that don't belong to a single component.

use serde::Deserialize;
use std::time::Duration;

/// Global configuration that applies to all components
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Grace period for in-flight flushes on shutdown or reload
    /// Default: 3s
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,

    /// Interval between metrics log lines
    /// Default: 60s
    #[serde(with = "humantime_serde")]
    pub metrics_interval: Duration,

    /// Pause between the startup catch-up pass and subscribing
    /// Default: 1s
    #[serde(with = "humantime_serde")]
    pub startup_pause: Duration,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            shutdown_grace: Duration::from_secs(3),
            metrics_interval: Duration::from_secs(60),
            startup_pause: Duration::from_secs(1),
        }
    }
}
