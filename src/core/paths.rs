//! State directory layout

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::config::{
    AUDIT_FILE_NAME, CONFIG_FILE_NAME, REGISTRY_FILE_NAME, STATE_DIR_ENV, STATE_DIR_NAME,
};

/// Where the registry, audit log and local config live for one local tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    root: PathBuf,
    state_dir: PathBuf,
}

impl StatePaths {
    /// `--state-dir`, else `$MIRROR_HOME`, else `<root>/.mirror`
    pub fn resolve(root: impl Into<PathBuf>, state_dir: Option<PathBuf>) -> Self {
        Self::resolve_with_env(root, state_dir, std::env::var_os(STATE_DIR_ENV))
    }

    fn resolve_with_env(
        root: impl Into<PathBuf>,
        state_dir: Option<PathBuf>,
        env: Option<OsString>,
    ) -> Self {
        let root = root.into();
        let state_dir = state_dir
            .or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
            .unwrap_or_else(|| root.join(STATE_DIR_NAME));
        Self { root, state_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn registry(&self) -> PathBuf {
        self.state_dir.join(REGISTRY_FILE_NAME)
    }

    pub fn audit_log(&self) -> PathBuf {
        self.state_dir.join(AUDIT_FILE_NAME)
    }

    pub fn config(&self) -> PathBuf {
        self.state_dir.join(CONFIG_FILE_NAME)
    }
}
