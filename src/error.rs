//! Error types shared by the registry, audit log and integrity hasher
//!
//! Per-remote failures during a sync run are *not* errors: they are recorded as
//! [`Outcome`](crate::sync::Outcome) values on the run. Only problems that abort
//! the whole operation surface as [`MirrorError`].

use std::path::PathBuf;

use thiserror::Error;

/// Broad classification used for exit codes and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, rejected before any I/O
    Validation,
    /// Probe-phase failure
    Connectivity,
    /// Push-phase failure after retries
    Transport,
    /// Storage medium failure
    Persistence,
    /// Deadline exceeded in either phase
    Timeout,
}

/// All errors that can abort a mirror operation.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("remote '{name}' already exists (use --replace to overwrite)")]
    DuplicateName { name: String },

    #[error("invalid remote name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("remote '{name}' not found")]
    NotFound { name: String },

    #[error("invalid exclude pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid configuration in {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    #[error("no remotes registered; add one with `mirror add-remote <name> <endpoint>`")]
    NoRemotes,

    /// Storage I/O failed. The event or entry being written was not persisted.
    #[error("persistence failure at {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted record could not be decoded.
    #[error("corrupt record in {path} at line {line}: {message}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MirrorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MirrorError::DuplicateName { .. }
            | MirrorError::InvalidName { .. }
            | MirrorError::InvalidEndpoint { .. }
            | MirrorError::NotFound { .. }
            | MirrorError::InvalidPattern { .. }
            | MirrorError::InvalidConfig { .. }
            | MirrorError::NoRemotes => ErrorKind::Validation,
            MirrorError::Persistence { .. } | MirrorError::Corrupt { .. } => {
                ErrorKind::Persistence
            }
            MirrorError::Io { .. } => ErrorKind::Persistence,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

/// Wraps a storage write failure with the path it happened at.
pub(crate) fn persistence_err(path: impl Into<PathBuf>, source: std::io::Error) -> MirrorError {
    MirrorError::Persistence {
        path: path.into(),
        source,
    }
}

/// Wraps a read failure with the path it happened at.
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> MirrorError {
    MirrorError::Io {
        path: path.into(),
        source,
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;
