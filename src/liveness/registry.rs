//! Session registry adapters.

use super::QueryError;
use crate::identity::OwnerIdentity;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Platform registry of live processes or sessions.
pub trait SessionRegistry: Send + Sync {
    /// Whether a session with exactly this process id and start time is active.
    fn find_active_session(&self, process_id: &str, start_time: &str)
    -> Result<bool, QueryError>;
}

impl<R: SessionRegistry + ?Sized> SessionRegistry for Arc<R> {
    fn find_active_session(
        &self,
        process_id: &str,
        start_time: &str,
    ) -> Result<bool, QueryError> {
        (**self).find_active_session(process_id, start_time)
    }
}

/// Registry holding an explicit set of live sessions.
///
/// Useful when the embedding application tracks sessions itself, and in
/// tests. Can be switched into a failing mode.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    sessions: Mutex<HashSet<OwnerIdentity>>,
    unavailable: AtomicBool,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(self, identity: OwnerIdentity) -> Self {
        self.insert(identity);
        self
    }

    pub fn insert(&self, identity: OwnerIdentity) {
        self.sessions().insert(identity);
    }

    pub fn remove(&self, identity: &OwnerIdentity) -> bool {
        self.sessions().remove(identity)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn sessions(&self) -> MutexGuard<'_, HashSet<OwnerIdentity>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl SessionRegistry for StaticRegistry {
    fn find_active_session(
        &self,
        process_id: &str,
        start_time: &str,
    ) -> Result<bool, QueryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueryError::Unavailable(
                "static registry switched off".to_string(),
            ));
        }
        Ok(self
            .sessions()
            .contains(&OwnerIdentity::new(process_id, start_time)))
    }
}
