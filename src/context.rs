//! Runtime context resolution for lockwarden commands.
//!
//! This module turns a loaded [`Config`] into the concrete pieces every
//! command works with: the event sinks, the SQLite store, this process's
//! owner identity and the liveness prober. Commands never build these
//! themselves, so they all agree on where the lock lives and how owners are
//! checked.

use crate::config::{Config, ProberKind};
use crate::coordinator::LockCoordinator;
use crate::error::Result;
use crate::events::{AuditLog, EventSink, FanoutSink, TracingSink};
use crate::identity::OwnerIdentity;
use crate::liveness::{AssumeAlive, LivenessProber, ProcessTable, RegistryProber};
use crate::store::{LockRecordStore, SqliteStore};
use std::sync::Arc;

/// Global overrides given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub resource: Option<String>,
    pub log_level: Option<String>,
}

/// Everything a command needs to talk to the lock.
#[derive(Clone)]
pub struct WardenContext {
    pub config: Config,
    events: Arc<dyn EventSink>,
    process_table: ProcessTable,
}

impl WardenContext {
    /// Build the context from config, logging to tracing and, when
    /// `audit_log` is set, to the audit file.
    pub fn new(config: Config) -> Self {
        let mut sinks = FanoutSink::new().with(Arc::new(TracingSink));
        if let Some(path) = &config.audit_log {
            sinks = sinks.with(Arc::new(AuditLog::new(path)));
        }
        Self::with_events(config, Arc::new(sinks))
    }

    /// Build the context with an explicit event sink.
    pub fn with_events(config: Config, events: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            events,
            process_table: ProcessTable::new(),
        }
    }

    /// Apply command-line overrides and re-validate.
    pub fn apply_overrides(config: &mut Config, overrides: &Overrides) -> Result<()> {
        if let Some(resource) = &overrides.resource {
            config.resource = resource.clone();
        }
        if let Some(level) = &overrides.log_level {
            config.log_level = level.clone();
        }
        config.validate()
    }

    pub fn events(&self) -> Arc<dyn EventSink> {
        self.events.clone()
    }

    pub fn resource(&self) -> &str {
        &self.config.resource
    }

    /// Open the configured database. The schema is created if missing, the
    /// lock row is not.
    pub fn open_store(&self) -> Result<Arc<SqliteStore>> {
        let store = SqliteStore::open(&self.config.database, self.config.busy_timeout())?;
        Ok(Arc::new(store))
    }

    /// Lock row accessor for the configured resource.
    pub fn record_store(&self, store: Arc<SqliteStore>) -> LockRecordStore {
        LockRecordStore::new(store, self.config.resource.clone(), self.events.clone())
    }

    /// Identity this process records as lock owner.
    pub fn identity(&self) -> Result<OwnerIdentity> {
        Ok(self.process_table.current_identity()?)
    }

    /// Prober selected by the `prober` setting.
    pub fn prober(&self) -> Box<dyn LivenessProber> {
        match self.config.prober {
            ProberKind::ProcessTable => Box::new(RegistryProber::new(
                self.process_table.clone(),
                self.events.clone(),
            )),
            ProberKind::AssumeAlive => Box::new(AssumeAlive),
        }
    }

    /// Coordinator for the configured resource, acting as this process.
    pub fn coordinator(&self) -> Result<LockCoordinator> {
        let store = self.record_store(self.open_store()?);
        Ok(LockCoordinator::new(
            store,
            self.prober(),
            self.identity()?,
            self.config.retry.clone(),
            self.events.clone(),
        ))
    }
}
