//! In-process lock store.

use super::{LockRecord, LockStore, StoreError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Lock store backed by a mutex-guarded map.
///
/// Has the same conditional-write semantics as [`super::SqliteStore`] and can
/// be shared between threads behind an `Arc`. It can also be switched into a
/// failing mode to exercise store-error paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, LockRecord>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the unlocked row for `resource` if it does not exist yet.
    /// Returns whether a row was created.
    pub fn bootstrap(&self, resource: &str) -> bool {
        let mut records = self.records();
        if records.contains_key(resource) {
            return false;
        }
        records.insert(resource.to_string(), LockRecord::unlocked());
        true
    }

    /// Overwrite the row for `resource`.
    pub fn put(&self, resource: &str, record: LockRecord) {
        self.records().insert(resource.to_string(), record);
    }

    /// Current row for `resource`, bypassing the failure switch.
    pub fn snapshot(&self, resource: &str) -> Option<LockRecord> {
        self.records().get(resource).cloned()
    }

    /// Make every subsequent operation fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, LockRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn check_available(&self, operation: &str) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            let message = format!("memory store unavailable during {}", operation);
            return Err(if operation == "read" {
                StoreError::Query(message)
            } else {
                StoreError::Write(message)
            });
        }
        Ok(())
    }
}

impl LockStore for MemoryStore {
    fn read(&self, resource: &str) -> Result<LockRecord, StoreError> {
        self.check_available("read")?;
        self.records()
            .get(resource)
            .cloned()
            .ok_or_else(|| StoreError::MissingRecord(resource.to_string()))
    }

    fn conditional_write(
        &self,
        resource: &str,
        expected: &LockRecord,
        new: &LockRecord,
    ) -> Result<bool, StoreError> {
        self.check_available("write")?;
        let mut records = self.records();
        let current = records
            .get_mut(resource)
            .ok_or_else(|| StoreError::MissingRecord(resource.to_string()))?;

        if !current.same_state(expected) {
            return Ok(false);
        }
        *current = new.clone();
        Ok(true)
    }

    fn force_clear(&self, resource: &str) -> Result<(), StoreError> {
        self.check_available("force_clear")?;
        let mut records = self.records();
        let current = records
            .get_mut(resource)
            .ok_or_else(|| StoreError::MissingRecord(resource.to_string()))?;
        *current = LockRecord::unlocked();
        Ok(())
    }
}
