//! Lock protocol events and the sinks that record them.
//!
//! Every component that needs to report something (store, prober,
//! coordinator) is handed an [`EventSink`] at construction. The CLI wires
//! a [`TracingSink`] and, when configured, an [`AuditLog`] that appends one
//! JSON object per line.
//!
//! # Audit Log Format
//!
//! Each line is a JSON object with:
//! - `ts`: RFC3339 timestamp
//! - `actor`: the owner string (e.g., `user@HOST`)
//! - `event`: the event kind (`acquired`, `reclaimed`, ...)
//! - event-specific fields (`resource`, `owner`, ...)

use crate::error::{Result, WardenError};
use crate::identity::OwnerIdentity;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Something the lock protocol observed or did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LockEvent {
    /// This process now holds the lock.
    Acquired {
        resource: String,
        owner: String,
        attempt: u32,
    },
    /// The lock is held by a process the registry confirms is running.
    HeldByActiveOwner {
        resource: String,
        owner: OwnerIdentity,
    },
    /// The recorded owner is gone and the lock was cleared.
    Reclaimed {
        resource: String,
        owner: OwnerIdentity,
    },
    /// Another process changed the row between the liveness check and the clear.
    ReclaimLost {
        resource: String,
        owner: OwnerIdentity,
    },
    /// The row is locked but the owner column cannot be decoded.
    OwnerUnparseable { resource: String, raw: String },
    /// The row is locked but carries no owner at all.
    OwnerMissing { resource: String },
    /// The owner's liveness could not be established; the lock is left alone.
    OwnerUnverified {
        resource: String,
        owner: OwnerIdentity,
        reason: String,
    },
    /// The session registry query failed.
    ProbeFailed {
        owner: OwnerIdentity,
        error: String,
    },
    /// A read or write against the lock store failed.
    StoreFailed {
        resource: String,
        operation: String,
        error: String,
    },
    /// Sleeping before the next acquisition attempt.
    Waiting {
        resource: String,
        attempt: u32,
        wait_ms: u64,
    },
    /// The retry budget ran out.
    TimedOut { resource: String, attempts: u32 },
    /// This process released the lock.
    Released { resource: String, owner: String },
    /// A release was requested by a process that is not the recorded holder.
    ReleaseSkipped {
        resource: String,
        caller: String,
        recorded_owner: String,
        locked: bool,
    },
    /// Releasing the lock from a dropped guard failed.
    ReleaseFailed { resource: String, error: String },
    /// An operator cleared the lock unconditionally.
    ForceCleared { resource: String },
}

impl LockEvent {
    /// The event kind as written to the audit log.
    pub fn name(&self) -> &'static str {
        match self {
            LockEvent::Acquired { .. } => "acquired",
            LockEvent::HeldByActiveOwner { .. } => "held_by_active_owner",
            LockEvent::Reclaimed { .. } => "reclaimed",
            LockEvent::ReclaimLost { .. } => "reclaim_lost",
            LockEvent::OwnerUnparseable { .. } => "owner_unparseable",
            LockEvent::OwnerMissing { .. } => "owner_missing",
            LockEvent::OwnerUnverified { .. } => "owner_unverified",
            LockEvent::ProbeFailed { .. } => "probe_failed",
            LockEvent::StoreFailed { .. } => "store_failed",
            LockEvent::Waiting { .. } => "waiting",
            LockEvent::TimedOut { .. } => "timed_out",
            LockEvent::Released { .. } => "released",
            LockEvent::ReleaseSkipped { .. } => "release_skipped",
            LockEvent::ReleaseFailed { .. } => "release_failed",
            LockEvent::ForceCleared { .. } => "force_cleared",
        }
    }
}

/// Injected logging capability.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LockEvent);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: &LockEvent) {
        (**self).emit(event)
    }
}

/// Forwards events to `tracing` with structured fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &LockEvent) {
        match event {
            LockEvent::Acquired {
                resource,
                owner,
                attempt,
            } => tracing::info!(%resource, %owner, attempt, "lock acquired"),
            LockEvent::HeldByActiveOwner { resource, owner } => tracing::warn!(
                %resource,
                pid = %owner.process_id,
                start_time = %owner.start_time,
                "lock held by a still active client, not releasing"
            ),
            LockEvent::Reclaimed { resource, owner } => tracing::warn!(
                %resource,
                pid = %owner.process_id,
                start_time = %owner.start_time,
                "lock was created by an inactive client, released it"
            ),
            LockEvent::ReclaimLost { resource, owner } => tracing::info!(
                %resource,
                pid = %owner.process_id,
                "stale lock changed hands before it could be released"
            ),
            LockEvent::OwnerUnparseable { resource, raw } => tracing::error!(
                %resource,
                %raw,
                "lock is held but the owner value cannot be parsed; clear it manually once the holder is known to be gone"
            ),
            LockEvent::OwnerMissing { resource } => {
                tracing::error!(%resource, "lock is held but owner information is missing")
            }
            LockEvent::OwnerUnverified {
                resource,
                owner,
                reason,
            } => tracing::warn!(
                %resource,
                pid = %owner.process_id,
                start_time = %owner.start_time,
                %reason,
                "cannot verify lock owner liveness, leaving lock in place"
            ),
            LockEvent::ProbeFailed { owner, error } => tracing::error!(
                pid = %owner.process_id,
                start_time = %owner.start_time,
                %error,
                "session registry query failed"
            ),
            LockEvent::StoreFailed {
                resource,
                operation,
                error,
            } => tracing::error!(%resource, %operation, %error, "lock store operation failed"),
            LockEvent::Waiting {
                resource,
                attempt,
                wait_ms,
            } => tracing::info!(%resource, attempt, wait_ms, "waiting for lock"),
            LockEvent::TimedOut { resource, attempts } => {
                tracing::error!(%resource, attempts, "gave up waiting for lock")
            }
            LockEvent::Released { resource, owner } => {
                tracing::info!(%resource, %owner, "lock released")
            }
            LockEvent::ReleaseSkipped {
                resource,
                caller,
                recorded_owner,
                locked,
            } => tracing::warn!(
                %resource,
                %caller,
                %recorded_owner,
                locked,
                "release requested by a process that does not hold the lock"
            ),
            LockEvent::ReleaseFailed { resource, error } => {
                tracing::warn!(%resource, %error, "failed to release lock")
            }
            LockEvent::ForceCleared { resource } => {
                tracing::warn!(%resource, "lock cleared by operator")
            }
        }
    }
}

/// One line of the audit log.
#[derive(Debug, Serialize)]
struct AuditRecord<'a> {
    ts: DateTime<Utc>,
    actor: &'a str,
    #[serde(flatten)]
    event: &'a LockEvent,
}

/// Append-only NDJSON audit trail of lock events.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
    actor: String,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            actor: get_actor_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an event as a single JSON line, creating the file if needed.
    pub fn append(&self, event: &LockEvent) -> Result<()> {
        let record = AuditRecord {
            ts: Utc::now(),
            actor: &self.actor,
            event,
        };
        let json_line = serde_json::to_string(&record).map_err(|e| {
            WardenError::UserError(format!("failed to serialize event to JSON: {}", e))
        })?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                WardenError::UserError(format!(
                    "failed to create audit log directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                WardenError::UserError(format!(
                    "failed to open audit log '{}': {}",
                    self.path.display(),
                    e
                ))
            })?;

        writeln!(file, "{}", json_line).map_err(|e| {
            WardenError::UserError(format!(
                "failed to write event to '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        file.sync_all().map_err(|e| {
            WardenError::UserError(format!(
                "failed to sync audit log '{}': {}",
                self.path.display(),
                e
            ))
        })
    }
}

impl EventSink for AuditLog {
    fn emit(&self, event: &LockEvent) {
        // The audit trail is best-effort; the lock protocol must not fail on it.
        if let Err(e) = self.append(event) {
            tracing::warn!(event = event.name(), error = %e, "failed to append audit event");
        }
    }
}

/// Sends every event to each inner sink in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &LockEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

/// Keeps every event in memory. Used by tests and embedders that want to
/// inspect what the protocol did.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LockEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events.
    pub fn events(&self) -> Vec<LockEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }

    /// Number of recorded events with the given kind.
    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .iter()
            .filter(|e| e.name() == name)
            .count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &LockEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push(event.clone());
    }
}

/// Get the actor string for audit records.
fn get_actor_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}
