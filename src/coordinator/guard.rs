//! RAII lock guard.

use super::LockCoordinator;
use crate::error::Result;
use crate::events::LockEvent;

/// Proof that the coordinator's process holds the lock.
///
/// When dropped, the lock is released. If the release fails during drop, a
/// `release_failed` event is emitted but no panic occurs.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    coordinator: &'a LockCoordinator,

    /// Whether the lock has been released manually.
    released: bool,
}

impl<'a> LockGuard<'a> {
    pub(super) fn new(coordinator: &'a LockCoordinator) -> Self {
        Self {
            coordinator,
            released: false,
        }
    }

    /// The protected resource key.
    pub fn resource(&self) -> &str {
        self.coordinator.resource()
    }

    /// Release the lock now and observe the outcome.
    ///
    /// Returns `false` when the row no longer names this process, e.g.
    /// because another process reclaimed it.
    pub fn release(mut self) -> Result<bool> {
        self.released = true;
        self.coordinator.release()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.coordinator.release() {
            self.coordinator.events.emit(&LockEvent::ReleaseFailed {
                resource: self.coordinator.resource().to_string(),
                error: e.to_string(),
            });
        }
    }
}
