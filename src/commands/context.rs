//! Shared state every command handler starts from

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::audit::AuditLog;
use crate::core::{Settings, StatePaths};
use crate::registry::RemoteRegistry;

/// Resolved state paths and settings for one invocation
#[derive(Debug, Clone)]
pub struct MirrorContext {
    paths: StatePaths,
    settings: Settings,
}

impl MirrorContext {
    /// Resolves the state directory for `root` and loads layered settings.
    pub fn load(root: impl Into<PathBuf>, state_dir: Option<PathBuf>) -> Result<Self> {
        let paths = StatePaths::resolve(root, state_dir);
        let settings = Settings::load(&paths.config())?;
        tracing::debug!(
            root = %paths.root().display(),
            state_dir = %paths.state_dir().display(),
            "Resolved mirror state"
        );
        Ok(Self { paths, settings })
    }

    pub fn new(paths: StatePaths, settings: Settings) -> Self {
        Self { paths, settings }
    }

    pub fn root(&self) -> &Path {
        self.paths.root()
    }

    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Opens the registry for modification; holds its lock until saved or dropped.
    pub fn open_registry(&self) -> Result<RemoteRegistry> {
        let path = self.paths.registry();
        RemoteRegistry::open(&path)
            .with_context(|| format!("Failed to load registry from {}", path.display()))
    }

    /// Unlocked snapshot of the registry for commands that only read it
    pub fn read_registry(&self) -> Result<RemoteRegistry> {
        let path = self.paths.registry();
        RemoteRegistry::read(&path)
            .with_context(|| format!("Failed to load registry from {}", path.display()))
    }

    pub fn open_audit_log(&self) -> Result<AuditLog> {
        let path = self.paths.audit_log();
        AuditLog::open(&path)
            .with_context(|| format!("Failed to open audit log at {}", path.display()))
    }
}
