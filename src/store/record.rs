//! The lock row.

use crate::identity::{OwnerField, OwnerIdentity};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// State of the lock row for one protected resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LockRecord {
    /// Whether a holder currently claims the lock.
    pub locked: bool,

    /// Encoded owner identity; empty when unlocked.
    pub owner: String,

    /// When the lock was last granted; cleared on release.
    pub granted_at: Option<DateTime<Utc>>,
}

impl LockRecord {
    /// An unlocked row with no owner.
    pub fn unlocked() -> Self {
        Self::default()
    }

    /// A row granted to `owner` at `granted_at`.
    pub fn held_by(owner: &OwnerIdentity, granted_at: DateTime<Utc>) -> Self {
        Self {
            locked: true,
            owner: owner.encode(),
            granted_at: Some(granted_at),
        }
    }

    /// Classify the owner column.
    pub fn owner_field(&self) -> OwnerField {
        OwnerField::classify(&self.owner)
    }

    /// Whether this row is held by exactly `identity`.
    pub fn is_held_by(&self, identity: &OwnerIdentity) -> bool {
        self.locked && self.owner.trim() == identity.encode()
    }

    /// Whether two rows agree on the fields a conditional write compares.
    pub fn same_state(&self, other: &LockRecord) -> bool {
        self.locked == other.locked && self.owner == other.owner
    }
}
