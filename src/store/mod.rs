//! Lock record storage.
//!
//! The lock for a protected resource is a single row holding:
//! - `locked`: whether a holder currently claims the lock
//! - `owner`: the encoded [`OwnerIdentity`] of the holder (empty when unlocked)
//! - `granted_at`: when the lock was last granted
//!
//! # Conditional Writes
//!
//! Every state transition made by the lock protocol is a conditional write:
//! the new state is applied only if the row still matches the state the
//! caller read. Two processes racing from the same unlocked read can
//! therefore never both succeed.
//!
//! Store failures are always surfaced as [`StoreError`]. A caller that cannot
//! see the lock state must not assume it is locked or unlocked.

mod memory;
mod record;
mod sqlite;


pub use memory::MemoryStore;
pub use record::LockRecord;
pub use sqlite::SqliteStore;

use crate::events::{EventSink, LockEvent};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Failure talking to the shared lock store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be opened or configured.
    #[error("failed to open lock store '{}': {message}", path.display())]
    Open { path: PathBuf, message: String },

    /// The lock row for the resource has not been bootstrapped.
    #[error("no lock record for resource '{0}' (run `lockwarden init` first)")]
    MissingRecord(String),

    /// A read failed.
    #[error("lock store query failed: {0}")]
    Query(String),

    /// A write failed.
    #[error("lock store write failed: {0}")]
    Write(String),
}

/// Adapter over the shared store holding lock rows.
pub trait LockStore: Send + Sync {
    /// Read the lock row for `resource`.
    fn read(&self, resource: &str) -> Result<LockRecord, StoreError>;

    /// Replace the row with `new` only if it still matches `expected`
    /// (same `locked` flag and owner). Returns whether the write applied.
    fn conditional_write(
        &self,
        resource: &str,
        expected: &LockRecord,
        new: &LockRecord,
    ) -> Result<bool, StoreError>;

    /// Clear the lock regardless of its current state.
    fn force_clear(&self, resource: &str) -> Result<(), StoreError>;
}

impl<S: LockStore + ?Sized> LockStore for Arc<S> {
    fn read(&self, resource: &str) -> Result<LockRecord, StoreError> {
        (**self).read(resource)
    }

    fn conditional_write(
        &self,
        resource: &str,
        expected: &LockRecord,
        new: &LockRecord,
    ) -> Result<bool, StoreError> {
        (**self).conditional_write(resource, expected, new)
    }

    fn force_clear(&self, resource: &str) -> Result<(), StoreError> {
        (**self).force_clear(resource)
    }
}

/// The lock row of one protected resource, with failures reported to the
/// injected event sink before they propagate.
#[derive(Clone)]
pub struct LockRecordStore {
    store: Arc<dyn LockStore>,
    resource: String,
    events: Arc<dyn EventSink>,
}

impl LockRecordStore {
    pub fn new(
        store: Arc<dyn LockStore>,
        resource: impl Into<String>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            resource: resource.into(),
            events,
        }
    }

    /// The protected resource key.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn read_lock_state(&self) -> Result<LockRecord, StoreError> {
        self.store
            .read(&self.resource)
            .map_err(|e| self.report("read", e))
    }

    /// Conditionally move the row from `expected` to `new`.
    pub fn write_lock_state(
        &self,
        expected: &LockRecord,
        new: &LockRecord,
    ) -> Result<bool, StoreError> {
        self.store
            .conditional_write(&self.resource, expected, new)
            .map_err(|e| self.report("write", e))
    }

    /// Clear a lock whose holder was confirmed gone.
    ///
    /// Guarded by the stale row itself: if another process reclaimed and
    /// re-acquired the lock since it was read, nothing is cleared and
    /// `false` is returned.
    pub fn reclaim(&self, stale: &LockRecord) -> Result<bool, StoreError> {
        self.store
            .conditional_write(&self.resource, stale, &LockRecord::unlocked())
            .map_err(|e| self.report("reclaim", e))
    }

    /// Clear `locked` and `owner` unconditionally.
    pub fn force_release(&self) -> Result<(), StoreError> {
        self.store
            .force_clear(&self.resource)
            .map_err(|e| self.report("force_release", e))?;
        self.events.emit(&LockEvent::ForceCleared {
            resource: self.resource.clone(),
        });
        Ok(())
    }

    fn report(&self, operation: &str, error: StoreError) -> StoreError {
        self.events.emit(&LockEvent::StoreFailed {
            resource: self.resource.clone(),
            operation: operation.to_string(),
            error: error.to_string(),
        });
        error
    }
}
