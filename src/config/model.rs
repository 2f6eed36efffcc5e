//! Config struct definition and default implementation.

use super::types::*;
use crate::coordinator::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for lockwarden.
///
/// This struct represents the contents of `lockwarden.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Store settings
    // =========================================================================
    /// SQLite database holding the lock rows.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Key of the protected resource (default: "changelog").
    #[serde(default = "default_resource")]
    pub resource: String,

    /// How long SQLite waits on a locked database file before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    // =========================================================================
    // Lock settings
    // =========================================================================
    /// Liveness prober used to decide whether a holder is gone.
    #[serde(default)]
    pub prober: ProberKind,

    /// Attempt budget and wait schedule for acquisition.
    #[serde(default)]
    pub retry: RetryPolicy,

    // =========================================================================
    // Logging settings
    // =========================================================================
    /// Optional NDJSON file receiving every lock event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log: Option<PathBuf>,

    /// Fallback filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            resource: default_resource(),
            busy_timeout_ms: default_busy_timeout_ms(),
            prober: ProberKind::default(),
            retry: RetryPolicy::default(),
            audit_log: None,
            log_level: default_log_level(),
        }
    }
}
