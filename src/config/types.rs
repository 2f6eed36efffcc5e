//! Configuration types and defaults for lockwarden.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "lockwarden.yaml";

/// How the liveness of a recorded lock owner is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProberKind {
    /// Look the owner up in the host process table (default).
    #[default]
    ProcessTable,
    /// Treat every owner as running. Stale locks then need `clear --force`.
    AssumeAlive,
}

// Default value functions for serde
pub(crate) fn default_database() -> PathBuf {
    PathBuf::from("lockwarden.db")
}
pub(crate) fn default_resource() -> String {
    "changelog".to_string()
}
pub(crate) fn default_busy_timeout_ms() -> u64 {
    5_000
}
pub(crate) fn default_log_level() -> String {
    "info".to_string()
}
