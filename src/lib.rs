//! Lockwarden: a database-backed mutual-exclusion lock for schema migrations.
//!
//! One row per protected resource in a shared store serializes an operation
//! across processes. Each holder records its `(process id, start time)`
//! identity; a waiting process reclaims the lock only when the session
//! registry confirms that no session with that exact identity is running.
//!
//! The pieces fit together like this:
//! - [`store`]: the lock row and its conditional writes
//! - [`liveness`]: session registries and owner probers
//! - [`coordinator`]: the acquisition protocol and the RAII guard
//! - [`events`]: the injected sink every component reports through

pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod identity;
pub mod liveness;
pub mod logging;
pub mod store;

pub use coordinator::{Attempt, LockCoordinator, LockGuard, OwnerState, RetryPolicy};
pub use error::{Result, WardenError};
pub use identity::OwnerIdentity;
