//! Remote registry: the durable list of named push targets
//!
//! The registry is an explicitly owned value. Commands open it from the state
//! directory, mutate it, and call [`RemoteRegistry::save`] before exiting.
//! An opened registry holds the file's write lock until it is saved or
//! dropped, so concurrent commands apply their changes one after another.

pub mod endpoint;
mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::audit::{AuditEntry, AuditEvent, RemoteChange};
use crate::error::{persistence_err, MirrorError, Result};
use crate::sync::SyncRun;

pub use endpoint::{validate_endpoint, validate_name, Transport};

/// A named, independently addressable destination for pushes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTarget {
    pub name: String,
    pub endpoint: String,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verified_at: Option<DateTime<Utc>>,
}

impl RemoteTarget {
    /// Builds a target after validating both name and endpoint.
    pub fn new(name: &str, endpoint: &str) -> Result<Self> {
        validate_name(name)?;
        validate_endpoint(endpoint)?;
        Ok(Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            added_at: Utc::now(),
            last_verified_at: None,
        })
    }

    pub fn transport(&self) -> Transport {
        // Stored endpoints were validated on insertion.
        validate_endpoint(&self.endpoint).unwrap_or(Transport::Url)
    }
}

/// Insertion-ordered set of remote targets, optionally backed by a file
#[derive(Debug, Default)]
pub struct RemoteRegistry {
    remotes: Vec<RemoteTarget>,
    path: Option<PathBuf>,
    dirty: bool,
    lock: Option<store::RegistryLock>,
    /// File contents as last loaded or written by this handle
    baseline: Vec<RemoteTarget>,
}

impl RemoteRegistry {
    /// An empty registry that is never persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Locks and loads the registry stored at `path` for modification. A
    /// missing file is an empty registry.
    ///
    /// Blocks while another handle holds the lock, including one in the
    /// same thread: drop or save a handle before opening the next.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let lock = store::RegistryLock::acquire(&path)?;
        let remotes = store::load(&path)?;
        tracing::debug!(path = %path.display(), count = remotes.len(), "loaded remote registry");
        Ok(Self {
            baseline: remotes.clone(),
            remotes,
            path: Some(path),
            dirty: false,
            lock: Some(lock),
        })
    }

    /// Loads a read-only snapshot of the registry at `path` without locking.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            remotes: store::load(path.as_ref())?,
            ..Self::default()
        })
    }

    /// Rebuilds registry contents by replaying audit entries in order.
    ///
    /// Remote changes are applied as recorded. Sync runs refresh
    /// `last_verified_at` for every remote that passed its probe.
    pub fn replay<'a>(entries: impl IntoIterator<Item = &'a AuditEntry>) -> Self {
        let mut registry = Self::in_memory();
        for entry in entries {
            match &entry.event {
                AuditEvent::Remote(RemoteChange::Added { target })
                | AuditEvent::Remote(RemoteChange::Replaced { target }) => {
                    match registry.position(&target.name) {
                        Some(index) => registry.remotes[index] = target.clone(),
                        None => registry.remotes.push(target.clone()),
                    }
                }
                AuditEvent::Remote(RemoteChange::Removed { name }) => {
                    registry.remotes.retain(|remote| &remote.name != name);
                }
                AuditEvent::Sync(run) => registry.record_verified(run),
                AuditEvent::Integrity(_) => {}
            }
        }
        registry.dirty = true;
        registry
    }

    /// Locks the file at `path` so that the next [`save`](Self::save)
    /// replaces it with this registry's contents.
    pub fn persist_to(mut self, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        self.lock = Some(store::RegistryLock::acquire(&path)?);
        self.path = Some(path);
        self.dirty = true;
        Ok(self)
    }

    /// Adds a target. Fails with `DuplicateName` unless `replace` is set.
    ///
    /// Replacing keeps the entry's position and original `added_at`, and clears
    /// `last_verified_at` since the new endpoint has never been probed.
    pub fn add(&mut self, name: &str, endpoint: &str, replace: bool) -> Result<RemoteTarget> {
        let target = RemoteTarget::new(name, endpoint)?;

        match self.position(name) {
            Some(_) if !replace => Err(MirrorError::DuplicateName {
                name: name.to_string(),
            }),
            Some(index) => {
                let existing = &mut self.remotes[index];
                existing.endpoint = target.endpoint;
                existing.last_verified_at = None;
                self.dirty = true;
                Ok(existing.clone())
            }
            None => {
                self.remotes.push(target.clone());
                self.dirty = true;
                Ok(target)
            }
        }
    }

    /// Removes a target and returns it.
    pub fn remove(&mut self, name: &str) -> Result<RemoteTarget> {
        let index = self.position(name).ok_or_else(|| MirrorError::NotFound {
            name: name.to_string(),
        })?;
        self.dirty = true;
        Ok(self.remotes.remove(index))
    }

    /// All targets in insertion order.
    pub fn list(&self) -> &[RemoteTarget] {
        &self.remotes
    }

    pub fn get(&self, name: &str) -> Option<&RemoteTarget> {
        self.remotes.iter().find(|remote| remote.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.remotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remotes.is_empty()
    }

    /// Records a successful probe. Unknown names are ignored.
    pub fn mark_verified(&mut self, name: &str, at: DateTime<Utc>) {
        if let Some(index) = self.position(name) {
            self.remotes[index].last_verified_at = Some(at);
            self.dirty = true;
        }
    }

    /// Stamps every remote that passed its probe in `run` with the run's
    /// finish time. Remotes whose endpoint changed since are left alone.
    pub fn record_verified(&mut self, run: &SyncRun) {
        for verified in run.verified_remotes() {
            if self
                .get(&verified.remote)
                .is_some_and(|remote| remote.endpoint == verified.endpoint)
            {
                self.mark_verified(&verified.remote, run.finished_at());
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Flushes the registry to its backing file, if it has one and changed,
    /// then releases the write lock.
    ///
    /// Saving again after that re-locks the file and fails if another
    /// handle changed it in between.
    pub fn save(&mut self) -> Result<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        if !self.dirty {
            self.lock = None;
            return Ok(());
        }

        let lock = match self.lock.take() {
            Some(lock) => lock,
            None => {
                let lock = store::RegistryLock::acquire(path)?;
                if store::load(path)? != self.baseline {
                    return Err(persistence_err(
                        path,
                        std::io::Error::other("registry changed on disk since it was loaded"),
                    ));
                }
                lock
            }
        };
        store::save(path, &self.remotes)?;
        drop(lock);

        self.baseline = self.remotes.clone();
        self.dirty = false;
        tracing::debug!(
            path = %path.display(),
            count = self.remotes.len(),
            "saved remote registry"
        );
        Ok(())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.remotes.iter().position(|remote| remote.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_then_list_keeps_insertion_order() {
        let mut registry = RemoteRegistry::in_memory();
        registry
            .add("zeta", "https://example.com/zeta.git", false)
            .unwrap();
        registry
            .add("alpha", "https://example.com/alpha.git", false)
            .unwrap();

        let names: Vec<_> = registry.list().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_duplicate_name_rejected_without_replace() {
        let mut registry = RemoteRegistry::in_memory();
        registry
            .add("origin", "https://example.com/a.git", false)
            .unwrap();

        let err = registry
            .add("origin", "https://example.com/b.git", false)
            .unwrap_err();
        assert!(matches!(err, MirrorError::DuplicateName { ref name } if name == "origin"));
        assert_eq!(
            registry.get("origin").unwrap().endpoint,
            "https://example.com/a.git"
        );
    }

    #[test]
    fn test_replace_updates_endpoint_in_place() {
        let mut registry = RemoteRegistry::in_memory();
        registry
            .add("origin", "https://example.com/a.git", false)
            .unwrap();
        registry
            .add("backup", "https://example.com/backup.git", false)
            .unwrap();
        registry.mark_verified("origin", Utc::now());
        let added_at = registry.get("origin").unwrap().added_at;

        let replaced = registry
            .add("origin", "git@example.com:b.git", true)
            .unwrap();

        assert_eq!(replaced.endpoint, "git@example.com:b.git");
        assert_eq!(replaced.added_at, added_at);
        assert!(replaced.last_verified_at.is_none());
        assert_eq!(registry.list()[0].name, "origin");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_invalid_endpoint_not_stored() {
        let mut registry = RemoteRegistry::in_memory();
        let err = registry.add("origin", "not a url", false).unwrap_err();
        assert!(matches!(err, MirrorError::InvalidEndpoint { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_replace_with_invalid_endpoint_keeps_old_entry() {
        let mut registry = RemoteRegistry::in_memory();
        registry
            .add("origin", "https://example.com/a.git", false)
            .unwrap();
        assert!(registry.add("origin", "ftp://nope/x", true).is_err());
        assert_eq!(
            registry.get("origin").unwrap().endpoint,
            "https://example.com/a.git"
        );
    }

    #[test]
    fn test_remove_missing_is_not_found() {
        let mut registry = RemoteRegistry::in_memory();
        let err = registry.remove("ghost").unwrap_err();
        assert!(matches!(err, MirrorError::NotFound { .. }));
    }

    #[test]
    fn test_remove_returns_entry() {
        let mut registry = RemoteRegistry::in_memory();
        registry
            .add("origin", "https://example.com/a.git", false)
            .unwrap();
        let removed = registry.remove("origin").unwrap();
        assert_eq!(removed.name, "origin");
        assert!(!registry.contains("origin"));
    }

    #[test]
    fn test_second_save_detects_outside_change() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("remotes.json");

        let mut first = RemoteRegistry::open(&path).unwrap();
        first.add("origin", "https://example.com/a.git", false).unwrap();
        first.save().unwrap();

        let mut second = RemoteRegistry::open(&path).unwrap();
        second.add("backup", "/srv/git/a.git", false).unwrap();
        second.save().unwrap();

        first.add("other", "/srv/git/b.git", false).unwrap();
        let err = first.save().unwrap_err();
        assert!(matches!(err, MirrorError::Persistence { .. }));

        let names: Vec<String> = RemoteRegistry::read(&path)
            .unwrap()
            .list()
            .iter()
            .map(|r| r.name.clone())
            .collect();
        assert_eq!(names, vec!["origin", "backup"]);
    }

    #[test]
    fn test_read_snapshot_is_never_saved() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("remotes.json");
        let mut snapshot = RemoteRegistry::read(&path).unwrap();
        snapshot.add("origin", "https://example.com/a.git", false).unwrap();
        snapshot.save().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_save_without_path_is_noop() {
        let mut registry = RemoteRegistry::in_memory();
        registry
            .add("origin", "https://example.com/a.git", false)
            .unwrap();
        assert!(registry.save().is_ok());
    }
}
