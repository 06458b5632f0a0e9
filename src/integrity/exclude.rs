//! Exclusion patterns for tree hashing
//!
//! Patterns use gitignore syntax, matched relative to the hashed root. A
//! fixed set of housekeeping paths is always excluded and cannot be
//! re-included.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};

use crate::core::config::STATE_DIR_NAME;
use crate::error::{MirrorError, Result};

/// Version-control metadata and generated logs, always excluded
pub const BUILTIN_EXCLUDES: &[&str] = &[".git/", ".hg/", ".svn/", "*.log", "logs/"];

/// Compiled exclusion matcher
#[derive(Clone, Debug)]
pub struct ExcludeSet {
    matcher: Gitignore,
    patterns: Vec<String>,
    /// Directories excluded by location rather than by pattern
    pinned: Vec<PathBuf>,
}

impl ExcludeSet {
    /// Builds the matcher from the built-in exclusions plus `extra`.
    pub fn new<S: AsRef<str>>(root: &Path, extra: &[S]) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(root);
        let mut patterns = Vec::new();

        let state_dir = format!("{STATE_DIR_NAME}/");
        let builtins = BUILTIN_EXCLUDES
            .iter()
            .copied()
            .chain(std::iter::once(state_dir.as_str()));
        for pattern in builtins {
            add_pattern(&mut builder, pattern)?;
            patterns.push(pattern.to_string());
        }

        for pattern in extra {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                return Err(invalid(pattern, "pattern cannot be empty"));
            }
            if pattern.starts_with('!') {
                return Err(invalid(pattern, "negated patterns are not supported"));
            }
            if pattern.starts_with('#') {
                return Err(invalid(pattern, "pattern cannot start with '#'"));
            }
            add_pattern(&mut builder, pattern)?;
            patterns.push(pattern.to_string());
        }

        let matcher = builder
            .build()
            .map_err(|e| invalid(&patterns.join(", "), &e.to_string()))?;
        Ok(Self {
            matcher,
            patterns,
            pinned: Vec::new(),
        })
    }

    /// Also excludes `state_dir` when it lives under `root`.
    ///
    /// Relocated state directories (`--state-dir`, `$MIRROR_HOME`) are not
    /// covered by the `.mirror/` pattern, so they are pinned by location.
    pub fn with_state_dir(mut self, root: &Path, state_dir: &Path) -> Self {
        if let Some(relative) = relative_to(root, state_dir) {
            if !relative.as_os_str().is_empty() {
                tracing::debug!(state_dir = %relative.display(), "excluding state directory");
                self.pinned.push(relative);
            }
        }
        self
    }

    /// True if `relative` (or any of its parent directories) is excluded.
    pub fn is_excluded(&self, relative: &Path, is_dir: bool) -> bool {
        if relative.as_os_str().is_empty() {
            return false;
        }
        if self.pinned.iter().any(|dir| relative.starts_with(dir)) {
            return true;
        }
        self.matcher
            .matched_path_or_any_parents(relative, is_dir)
            .is_ignore()
    }

    /// Every active pattern, built-ins first
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// `path` relative to `root`, resolving symlinks and `..` when the plain
/// prefix check fails. A state dir that does not exist yet has nothing to hash.
fn relative_to(root: &Path, path: &Path) -> Option<PathBuf> {
    if let Ok(relative) = path.strip_prefix(root) {
        return Some(relative.to_path_buf());
    }
    let root = root.canonicalize().ok()?;
    let path = path.canonicalize().ok()?;
    path.strip_prefix(&root).ok().map(Path::to_path_buf)
}

fn add_pattern(builder: &mut GitignoreBuilder, pattern: &str) -> Result<()> {
    builder
        .add_line(None, pattern)
        .map(|_| ())
        .map_err(|e| invalid(pattern, &e.to_string()))
}

fn invalid(pattern: &str, reason: &str) -> MirrorError {
    MirrorError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    }
}
