//! Lock owner liveness checks.
//!
//! A lock is only reclaimed after the session registry positively confirms
//! that no session matches *both* the recorded process id and the recorded
//! start time. A registry that cannot answer yields [`QueryError`], which
//! callers must treat as "unknown", never as "dead".

mod probers;
mod process_table;
mod registry;


pub use probers::{AssumeAlive, RegistryProber};
pub use process_table::ProcessTable;
pub use registry::{SessionRegistry, StaticRegistry};

use crate::identity::OwnerIdentity;
use thiserror::Error;

/// The session registry could not answer a liveness query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The registry as a whole is not reachable on this host.
    #[error("session registry unavailable: {0}")]
    Unavailable(String),

    /// The entry for one process could not be read.
    #[error("failed to read session for process {process_id}: {message}")]
    Read { process_id: String, message: String },

    /// The registry returned something that cannot be interpreted.
    #[error("malformed session entry for process {process_id}: {message}")]
    Malformed { process_id: String, message: String },
}

/// Decides whether a recorded lock owner is still running.
pub trait LivenessProber: Send + Sync {
    /// `Ok(true)` only on an exact `(process id, start time)` match,
    /// `Ok(false)` only when the registry confirms there is none.
    fn is_active(&self, identity: &OwnerIdentity) -> Result<bool, QueryError>;
}
