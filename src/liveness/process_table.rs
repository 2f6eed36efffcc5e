//! Host process table as a session registry (Linux `/proc`).
//!
//! A process start time is recorded as
//! `<host>/<boot id>/<pid namespace>/<start ticks>`:
//! - `host` is the host name; owners on other hosts cannot be checked from
//!   here and are never reported dead
//! - `boot id` from `sys/kernel/random/boot_id`, so a lock left over from
//!   before a reboot of this host is recognised as dead
//! - `pid namespace` inode from `self/ns/pid`, so owners whose pids are not
//!   visible from here are never mistaken for dead ones
//! - `start ticks` is field 22 of `<pid>/stat` (clock ticks since boot)

use super::{QueryError, SessionRegistry};
use crate::identity::OwnerIdentity;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const DEFAULT_PROC_ROOT: &str = "/proc";

/// Zero-based index of `starttime` among the fields after the command name.
const START_TICKS_FIELD: usize = 19;

/// Recorded start time, split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StartStamp {
    host: String,
    boot_id: String,
    pid_namespace: String,
    start_ticks: String,
}

impl StartStamp {
    fn encode(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.host, self.boot_id, self.pid_namespace, self.start_ticks
        )
    }

    fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.trim().splitn(4, '/');
        let host = parts.next().filter(|p| !p.is_empty())?;
        let boot_id = parts.next().filter(|p| !p.is_empty())?;
        let pid_namespace = parts.next().filter(|p| !p.is_empty())?;
        let start_ticks = parts.next().filter(|p| !p.is_empty())?;
        Some(Self {
            host: host.to_string(),
            boot_id: boot_id.to_string(),
            pid_namespace: pid_namespace.to_string(),
            start_ticks: start_ticks.to_string(),
        })
    }
}

/// Entry of `<pid>/stat` that matters here.
struct StatEntry {
    state: char,
    start_ticks: String,
}

impl StatEntry {
    /// Zombies have exited and only wait to be reaped.
    fn is_running(&self) -> bool {
        !matches!(self.state, 'Z' | 'X' | 'x')
    }
}

/// Session registry backed by the host's `/proc` tree.
#[derive(Debug, Clone)]
pub struct ProcessTable {
    proc_root: PathBuf,
    host: Option<String>,
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::with_root(DEFAULT_PROC_ROOT)
    }

    /// Use a different mount point for the process table.
    pub fn with_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            host: None,
        }
    }

    /// Use a fixed host name instead of asking the system.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Identity of the calling process.
    pub fn current_identity(&self) -> Result<OwnerIdentity, QueryError> {
        self.identity_of(std::process::id())
    }

    /// Identity of process `pid` as it would be recorded in a lock row.
    pub fn identity_of(&self, pid: u32) -> Result<OwnerIdentity, QueryError> {
        let process_id = pid.to_string();
        let entry = self.read_stat(&process_id)?.ok_or_else(|| QueryError::Read {
            process_id: process_id.clone(),
            message: "process is not in the process table".to_string(),
        })?;

        let stamp = StartStamp {
            host: self.host()?,
            boot_id: self.boot_id()?,
            pid_namespace: self.pid_namespace()?,
            start_ticks: entry.start_ticks,
        };
        Ok(OwnerIdentity::new(process_id, stamp.encode()))
    }

    /// Host name, with `/` replaced so it stays one stamp segment.
    fn host(&self) -> Result<String, QueryError> {
        let host = match &self.host {
            Some(host) => host.clone(),
            None => hostname::get()
                .map_err(|e| QueryError::Unavailable(format!("failed to read host name: {}", e)))?
                .to_string_lossy()
                .to_string(),
        };
        let host = host.trim().replace('/', "_");
        if host.is_empty() {
            return Err(QueryError::Unavailable("host name is empty".to_string()));
        }
        Ok(host)
    }

    fn boot_id(&self) -> Result<String, QueryError> {
        let path = self.proc_root.join("sys/kernel/random/boot_id");
        let boot_id = fs::read_to_string(&path)
            .map_err(|e| unavailable(&path, e))?
            .trim()
            .to_string();
        if boot_id.is_empty() {
            return Err(QueryError::Unavailable(format!(
                "'{}' is empty",
                path.display()
            )));
        }
        Ok(boot_id)
    }

    /// Inode of our pid namespace, from a link such as `pid:[4026531836]`.
    fn pid_namespace(&self) -> Result<String, QueryError> {
        let path = self.proc_root.join("self/ns/pid");
        let target = fs::read_link(&path).map_err(|e| unavailable(&path, e))?;
        let target = target.to_string_lossy();
        let inode: String = target.chars().filter(char::is_ascii_digit).collect();
        if inode.is_empty() {
            return Err(QueryError::Unavailable(format!(
                "unexpected pid namespace link '{}'",
                target
            )));
        }
        Ok(inode)
    }

    /// With `hidepid` mounts other users' processes vanish from the table,
    /// which would make every foreign owner look dead.
    fn ensure_table_visible(&self) -> Result<(), QueryError> {
        let init = self.proc_root.join("1");
        if !init.exists() {
            return Err(QueryError::Unavailable(format!(
                "'{}' is not visible; the process table appears to be restricted",
                init.display()
            )));
        }
        Ok(())
    }

    /// `Ok(None)` when the process does not exist.
    fn read_stat(&self, process_id: &str) -> Result<Option<StatEntry>, QueryError> {
        if process_id.parse::<u32>().is_err() {
            return Err(QueryError::Malformed {
                process_id: process_id.to_string(),
                message: "process id is not numeric".to_string(),
            });
        }

        let path = self.proc_root.join(process_id).join("stat");
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(QueryError::Read {
                    process_id: process_id.to_string(),
                    message: format!("failed to read '{}': {}", path.display(), e),
                });
            }
        };

        parse_stat(process_id, &content).map(Some)
    }
}

fn unavailable(path: &Path, e: std::io::Error) -> QueryError {
    QueryError::Unavailable(format!("failed to read '{}': {}", path.display(), e))
}

/// Parse `<pid>/stat`. The command name may contain spaces and parentheses,
/// so fields are counted from the last `)`.
fn parse_stat(process_id: &str, content: &str) -> Result<StatEntry, QueryError> {
    let malformed = |message: &str| QueryError::Malformed {
        process_id: process_id.to_string(),
        message: message.to_string(),
    };

    let close = content
        .rfind(')')
        .ok_or_else(|| malformed("missing command name"))?;
    let fields: Vec<&str> = content[close + 1..].split_whitespace().collect();

    let state = fields
        .first()
        .and_then(|f| f.chars().next())
        .ok_or_else(|| malformed("missing process state"))?;
    let start_ticks = fields
        .get(START_TICKS_FIELD)
        .filter(|f| f.chars().all(|c| c.is_ascii_digit()))
        .ok_or_else(|| malformed("missing or non-numeric start time"))?;

    Ok(StatEntry {
        state,
        start_ticks: start_ticks.to_string(),
    })
}

impl SessionRegistry for ProcessTable {
    fn find_active_session(
        &self,
        process_id: &str,
        start_time: &str,
    ) -> Result<bool, QueryError> {
        let recorded = StartStamp::parse(start_time).ok_or_else(|| QueryError::Malformed {
            process_id: process_id.to_string(),
            message: format!(
                "start time '{}' is not '<host>/<boot id>/<pid ns>/<ticks>'",
                start_time
            ),
        })?;

        let host = self.host()?;
        if recorded.host != host {
            return Err(QueryError::Unavailable(format!(
                "owner runs on host '{}' but this process runs on '{}'",
                recorded.host, host
            )));
        }
        if recorded.boot_id != self.boot_id()? {
            // Recorded on this host during an earlier boot.
            return Ok(false);
        }
        let namespace = self.pid_namespace()?;
        if recorded.pid_namespace != namespace {
            return Err(QueryError::Unavailable(format!(
                "owner runs in pid namespace {} but this process sees namespace {}",
                recorded.pid_namespace, namespace
            )));
        }
        self.ensure_table_visible()?;

        match self.read_stat(process_id)? {
            Some(entry) => Ok(entry.is_running() && entry.start_ticks == recorded.start_ticks),
            None => Ok(false),
        }
    }
}
