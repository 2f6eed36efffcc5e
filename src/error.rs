//! Error types for lockwarden.
//!
//! Component errors (`StoreError`, `QueryError`) live next to the adapters
//! that raise them and convert into [`WardenError`] at the coordinator and
//! command boundaries.

use crate::exit_codes;
use crate::liveness::QueryError;
use crate::store::StoreError;
use thiserror::Error;

/// Main error type for lockwarden operations.
///
/// Each variant maps to a specific process exit code.
#[derive(Error, Debug)]
pub enum WardenError {
    /// User provided invalid arguments or asked for a refused operation.
    #[error("{0}")]
    UserError(String),

    /// Configuration file could not be read or failed validation.
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// The shared lock store failed. Never interpreted as any lock state.
    #[error("Lock store failure: {0}")]
    Store(#[from] StoreError),

    /// The session registry could not answer.
    #[error("Liveness query failed: {0}")]
    Query(#[from] QueryError),

    /// The retry budget ran out while another owner held the lock.
    #[error("Timed out waiting for lock '{resource}' after {attempts} attempts")]
    LockTimeout { resource: String, attempts: u32 },

    /// The caller abandoned acquisition at a retry boundary.
    #[error("Gave up waiting for lock '{resource}'")]
    Cancelled { resource: String },

    /// The protected command ran but did not succeed.
    #[error("Protected command `{command}` failed: {status}")]
    OperationFailed { command: String, status: String },
}

impl WardenError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            WardenError::UserError(_) => exit_codes::USER_ERROR,
            WardenError::ConfigError(_) => exit_codes::USER_ERROR,
            WardenError::Store(_) => exit_codes::STORE_FAILURE,
            WardenError::Query(_) => exit_codes::QUERY_FAILURE,
            WardenError::LockTimeout { .. } => exit_codes::LOCK_FAILURE,
            WardenError::Cancelled { .. } => exit_codes::LOCK_FAILURE,
            WardenError::OperationFailed { .. } => exit_codes::OPERATION_FAILURE,
        }
    }
}

/// Result type alias for lockwarden operations.
pub type Result<T> = std::result::Result<T, WardenError>;
