//! Liveness prober implementations.

use super::{LivenessProber, QueryError, SessionRegistry};
use crate::events::{EventSink, LockEvent};
use crate::identity::OwnerIdentity;
use std::sync::Arc;

/// Prober that asks a [`SessionRegistry`] for an exact compound match.
pub struct RegistryProber<R> {
    registry: R,
    events: Arc<dyn EventSink>,
}

impl<R: SessionRegistry> RegistryProber<R> {
    pub fn new(registry: R, events: Arc<dyn EventSink>) -> Self {
        Self { registry, events }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }
}

impl<R: SessionRegistry> LivenessProber for RegistryProber<R> {
    fn is_active(&self, identity: &OwnerIdentity) -> Result<bool, QueryError> {
        self.registry
            .find_active_session(&identity.process_id, &identity.start_time)
            .inspect_err(|e| {
                self.events.emit(&LockEvent::ProbeFailed {
                    owner: identity.clone(),
                    error: e.to_string(),
                })
            })
    }
}

/// Prober that reports every owner as running, which disables reclamation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeAlive;

impl LivenessProber for AssumeAlive {
    fn is_active(&self, _identity: &OwnerIdentity) -> Result<bool, QueryError> {
        Ok(true)
    }
}
