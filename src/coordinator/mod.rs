//! Lock coordination.
//!
//! [`LockCoordinator`] owns the acquisition protocol for one protected
//! resource. Each attempt reads the lock row once and then:
//! - unlocked: tries one conditional write claiming the lock
//! - locked by a running owner: leaves it alone and waits
//! - locked by an owner the registry confirms is gone: reclaims the row and
//!   retries at once
//! - locked by an unreadable, missing or unverifiable owner: logs the
//!   anomaly, leaves it alone and waits
//!
//! Only a positive answer from the liveness prober that the owner is gone
//! leads to reclamation. Store failures abort the attempt and propagate.
//!
//! # RAII Guards
//!
//! `acquire()` returns a [`LockGuard`] that releases the lock when dropped,
//! so the protected operation cannot leak the lock on an early return or a
//! panic.

mod guard;
mod retry;

#[cfg(test)]
mod tests;

pub use guard::LockGuard;
pub use retry::{Backoff, RetryPolicy};

use crate::error::{Result, WardenError};
use crate::events::{EventSink, LockEvent};
use crate::identity::{OwnerField, OwnerIdentity, ParseError};
use crate::liveness::{LivenessProber, QueryError};
use crate::store::{LockRecord, LockRecordStore};
use chrono::Utc;
use std::sync::Arc;

/// Outcome of a single acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// This process now holds the lock.
    Acquired,
    /// The row was unlocked but another process won the conditional write.
    Contended,
    /// A stale lock was cleared; the next attempt may take it.
    Reclaimed,
    /// A running owner holds the lock.
    HeldByActiveOwner(OwnerIdentity),
    /// The lock is held but its owner could not be verified.
    Unverified,
}

impl Attempt {
    /// Whether the next attempt should follow without waiting.
    fn retry_immediately(&self) -> bool {
        matches!(self, Attempt::Contended | Attempt::Reclaimed)
    }
}

/// What is known about the current holder of the lock.
#[derive(Debug)]
pub enum OwnerState {
    /// Nobody holds the lock.
    Unlocked,
    /// The owner is confirmed running.
    Active(OwnerIdentity),
    /// The registry confirms the owner is gone.
    Inactive(OwnerIdentity),
    /// Locked, but the owner column is empty.
    Missing,
    /// Locked, but the owner column cannot be decoded.
    Unparseable(ParseError),
    /// The liveness query failed.
    Unverified(OwnerIdentity, QueryError),
}

impl OwnerState {
    /// Whether the lock may be reclaimed on this evidence.
    pub fn is_reclaimable(&self) -> bool {
        matches!(self, OwnerState::Inactive(_))
    }
}

/// Snapshot of the lock row and its owner's liveness.
#[derive(Debug)]
pub struct LockStatus {
    pub record: LockRecord,
    pub owner: OwnerState,
}

/// Acquires and releases the lock for one resource on behalf of one process.
pub struct LockCoordinator {
    store: LockRecordStore,
    prober: Box<dyn LivenessProber>,
    identity: OwnerIdentity,
    policy: RetryPolicy,
    events: Arc<dyn EventSink>,
}

impl LockCoordinator {
    /// Assemble a coordinator.
    ///
    /// `identity` is what this process records as owner; it must come from
    /// the same registry the prober consults.
    pub fn new(
        store: LockRecordStore,
        prober: Box<dyn LivenessProber>,
        identity: OwnerIdentity,
        policy: RetryPolicy,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            prober,
            identity,
            policy,
            events,
        }
    }

    pub fn identity(&self) -> &OwnerIdentity {
        &self.identity
    }

    pub fn resource(&self) -> &str {
        self.store.resource()
    }

    /// Read the lock row and classify its owner without changing anything.
    pub fn inspect(&self) -> Result<LockStatus> {
        let record = self.store.read_lock_state()?;
        let owner = self.assess(&record);
        Ok(LockStatus { record, owner })
    }

    fn assess(&self, record: &LockRecord) -> OwnerState {
        if !record.locked {
            return OwnerState::Unlocked;
        }
        match record.owner_field() {
            OwnerField::Empty => OwnerState::Missing,
            OwnerField::Unparseable(err) => OwnerState::Unparseable(err),
            OwnerField::Identity(owner) => match self.prober.is_active(&owner) {
                Ok(true) => OwnerState::Active(owner),
                Ok(false) => OwnerState::Inactive(owner),
                Err(err) => OwnerState::Unverified(owner, err),
            },
        }
    }

    /// Run one acquisition attempt: one read, then at most one claim or
    /// one reclamation.
    pub fn try_acquire(&self, attempt: u32) -> Result<Attempt> {
        let record = self.store.read_lock_state()?;
        let resource = self.resource().to_string();

        match self.assess(&record) {
            OwnerState::Unlocked => {
                let claim = LockRecord::held_by(&self.identity, Utc::now());
                if self.store.write_lock_state(&record, &claim)? {
                    self.events.emit(&LockEvent::Acquired {
                        resource,
                        owner: claim.owner,
                        attempt,
                    });
                    Ok(Attempt::Acquired)
                } else {
                    tracing::debug!(%resource, attempt, "lost race for unlocked row");
                    Ok(Attempt::Contended)
                }
            }
            OwnerState::Active(owner) => {
                self.events.emit(&LockEvent::HeldByActiveOwner {
                    resource,
                    owner: owner.clone(),
                });
                Ok(Attempt::HeldByActiveOwner(owner))
            }
            OwnerState::Inactive(owner) => {
                if self.store.reclaim(&record)? {
                    self.events
                        .emit(&LockEvent::Reclaimed { resource, owner });
                    Ok(Attempt::Reclaimed)
                } else {
                    self.events
                        .emit(&LockEvent::ReclaimLost { resource, owner });
                    Ok(Attempt::Contended)
                }
            }
            OwnerState::Missing => {
                self.events.emit(&LockEvent::OwnerMissing { resource });
                Ok(Attempt::Unverified)
            }
            OwnerState::Unparseable(err) => {
                self.events.emit(&LockEvent::OwnerUnparseable {
                    resource,
                    raw: err.raw,
                });
                Ok(Attempt::Unverified)
            }
            OwnerState::Unverified(owner, err) => {
                self.events.emit(&LockEvent::OwnerUnverified {
                    resource,
                    owner,
                    reason: err.to_string(),
                });
                Ok(Attempt::Unverified)
            }
        }
    }

    /// Block until the lock is held or the retry budget is spent.
    pub fn acquire(&self) -> Result<LockGuard<'_>> {
        self.acquire_until(|| false)
    }

    /// Like [`acquire`](Self::acquire), but checks `cancelled` before every
    /// attempt. Giving up leaves nothing behind: no write has been made on
    /// this process's behalf unless the lock was obtained.
    ///
    /// A reclaim on the final attempt earns one extra attempt outside the
    /// budget, so even `max_attempts = 1` can take a stale lock.
    pub fn acquire_until(&self, cancelled: impl Fn() -> bool) -> Result<LockGuard<'_>> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut budget = max_attempts;
        let mut attempt = 0;

        while attempt < budget {
            attempt += 1;
            if cancelled() {
                return Err(WardenError::Cancelled {
                    resource: self.resource().to_string(),
                });
            }

            let outcome = self.try_acquire(attempt)?;
            if outcome == Attempt::Acquired {
                return Ok(LockGuard::new(self));
            }
            if outcome == Attempt::Reclaimed && attempt == budget && budget == max_attempts {
                budget += 1;
                continue;
            }
            if outcome.retry_immediately() || attempt == budget {
                continue;
            }

            let wait = self.policy.delay(attempt);
            self.events.emit(&LockEvent::Waiting {
                resource: self.resource().to_string(),
                attempt,
                wait_ms: wait.as_millis().min(u64::MAX as u128) as u64,
            });
            std::thread::sleep(wait);
        }

        self.events.emit(&LockEvent::TimedOut {
            resource: self.resource().to_string(),
            attempts: attempt,
        });
        Err(WardenError::LockTimeout {
            resource: self.resource().to_string(),
            attempts: attempt,
        })
    }

    /// Release the lock if, and only if, this process is the recorded holder.
    ///
    /// Returns whether the row was released. Any other situation is a no-op
    /// with a `release_skipped` event.
    pub fn release(&self) -> Result<bool> {
        let record = self.store.read_lock_state()?;
        let caller = self.identity.encode();

        if !record.is_held_by(&self.identity) {
            self.events.emit(&LockEvent::ReleaseSkipped {
                resource: self.resource().to_string(),
                caller,
                recorded_owner: record.owner,
                locked: record.locked,
            });
            return Ok(false);
        }

        if self.store.write_lock_state(&record, &LockRecord::unlocked())? {
            self.events.emit(&LockEvent::Released {
                resource: self.resource().to_string(),
                owner: caller,
            });
            return Ok(true);
        }

        let current = self.store.read_lock_state()?;
        self.events.emit(&LockEvent::ReleaseSkipped {
            resource: self.resource().to_string(),
            caller,
            recorded_owner: current.owner,
            locked: current.locked,
        });
        Ok(false)
    }

    /// Acquire the lock, run `operation` exactly once, and release the lock
    /// on every exit path (including a panic inside `operation`).
    pub fn with_lock<T>(&self, operation: impl FnOnce() -> T) -> Result<T> {
        let guard = self.acquire()?;
        let output = operation();
        guard.release()?;
        Ok(output)
    }
}
