//! Append-only audit log of sync runs, integrity records and registry changes
//!
//! The log is a JSON Lines file. Every line is an [`AuditEntry`] carrying a
//! sequence number and a hash that chains it to the previous entry, so any
//! edit or deletion of history is detectable with [`AuditLog::verify_chain`].

pub mod chain;
mod log;
pub mod query;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::integrity::IntegrityRecord;
use crate::registry::RemoteTarget;
use crate::sync::SyncRun;

pub use chain::{ChainError, ChainReport};
pub use log::AuditLog;
pub use query::{AuditFilter, AuditIter, AuditQuery};

/// A change to the remote registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RemoteChange {
    Added { target: RemoteTarget },
    Replaced { target: RemoteTarget },
    Removed { name: String },
}

impl RemoteChange {
    pub fn remote_name(&self) -> &str {
        match self {
            RemoteChange::Added { target } | RemoteChange::Replaced { target } => &target.name,
            RemoteChange::Removed { name } => name,
        }
    }
}

/// Anything worth recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AuditEvent {
    Sync(SyncRun),
    Integrity(IntegrityRecord),
    Remote(RemoteChange),
}

impl AuditEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AuditEvent::Sync(_) => EventKind::Sync,
            AuditEvent::Integrity(_) => EventKind::Integrity,
            AuditEvent::Remote(_) => EventKind::Remote,
        }
    }

    /// True if the event concerns the named remote
    pub fn involves(&self, remote: &str) -> bool {
        match self {
            AuditEvent::Sync(run) => run.involves(remote),
            AuditEvent::Remote(change) => change.remote_name() == remote,
            AuditEvent::Integrity(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Sync,
    Integrity,
    Remote,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            EventKind::Sync => "sync",
            EventKind::Integrity => "integrity",
            EventKind::Remote => "remote",
        };
        f.write_str(text)
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sync" => Ok(EventKind::Sync),
            "integrity" => Ok(EventKind::Integrity),
            "remote" => Ok(EventKind::Remote),
            other => Err(format!(
                "unknown event kind '{other}' (expected sync, integrity or remote)"
            )),
        }
    }
}

/// One persisted line of the audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub recorded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    pub entry_hash: String,
    pub event: AuditEvent,
}
