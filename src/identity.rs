//! Lock owner identity and its on-row encoding.
//!
//! A lock holder is identified by the pair `(process id, start time)`.
//! Process ids are recycled by the operating system, so the id alone can
//! never distinguish the original holder from an unrelated process that was
//! later handed the same number. The start time closes that gap.
//!
//! The pair is stored in a single text column as
//! `<process id>@@<start time>`.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Separator between the process id and the start time in an encoded owner.
pub const OWNER_SEPARATOR: &str = "@@";

/// Identity of a specific process instance holding (or asking for) the lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct OwnerIdentity {
    /// Host process identifier as reported by the session registry.
    pub process_id: String,

    /// Exact process/session start time as reported by the session registry.
    pub start_time: String,
}

impl OwnerIdentity {
    pub fn new(process_id: impl Into<String>, start_time: impl Into<String>) -> Self {
        Self {
            process_id: process_id.into(),
            start_time: start_time.into(),
        }
    }

    /// Encode this identity for the owner column.
    pub fn encode(&self) -> String {
        encode(&self.process_id, &self.start_time)
    }
}

impl fmt::Display for OwnerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid={}, start_time={}", self.process_id, self.start_time)
    }
}

/// The owner column could not be split into a process id and a start time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot parse lock owner '{raw}': expected '<process id>@@<start time>'")]
pub struct ParseError {
    /// The raw column value, kept for operator diagnostics.
    pub raw: String,
}

/// Encode a `(process id, start time)` pair into a single owner token.
pub fn encode(process_id: &str, start_time: &str) -> String {
    format!("{}{}{}", process_id, OWNER_SEPARATOR, start_time)
}

/// Decode an owner token.
///
/// Empty tokens are skipped, so `"42@@"` or `"@@x"` fail just like a value
/// with no separator at all. Tokens beyond the second are ignored.
pub fn decode(raw: &str) -> Result<OwnerIdentity, ParseError> {
    let mut tokens = raw
        .trim()
        .split(OWNER_SEPARATOR)
        .map(str::trim)
        .filter(|t| !t.is_empty());

    match (tokens.next(), tokens.next()) {
        (Some(process_id), Some(start_time)) => Ok(OwnerIdentity::new(process_id, start_time)),
        _ => Err(ParseError {
            raw: raw.to_string(),
        }),
    }
}

/// Classification of a raw owner column value.
///
/// "No owner recorded" and "owner recorded but unreadable" are different
/// operator situations and are kept apart here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerField {
    /// The column is empty or blank.
    Empty,
    /// The column decodes to an identity.
    Identity(OwnerIdentity),
    /// The column is non-empty but malformed.
    Unparseable(ParseError),
}

impl OwnerField {
    pub fn classify(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return OwnerField::Empty;
        }
        match decode(raw) {
            Ok(identity) => OwnerField::Identity(identity),
            Err(err) => OwnerField::Unparseable(err),
        }
    }
}
