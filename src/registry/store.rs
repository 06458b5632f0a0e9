//! On-disk format for the remote registry
//!
//! One JSON document holding one record per remote. Writers serialize on an
//! exclusive lock over a sibling `<file>.lock`; the document itself is
//! written to a temp file and renamed over the original.

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::RemoteTarget;
use crate::error::{io_err, persistence_err, MirrorError, Result};

const REGISTRY_FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct RegistryFile {
    version: u32,
    remotes: Vec<RemoteTarget>,
}

/// Exclusive hold on the registry file, released on drop
#[derive(Debug)]
pub(super) struct RegistryLock {
    file: File,
    path: PathBuf,
}

impl RegistryLock {
    /// Blocks until no other handle holds the lock for `registry`.
    pub(super) fn acquire(registry: &Path) -> Result<Self> {
        if let Some(parent) = registry.parent() {
            fs::create_dir_all(parent).map_err(|e| persistence_err(parent, e))?;
        }
        let path = lock_path(registry);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| persistence_err(&path, e))?;
        file.lock_exclusive().map_err(|e| persistence_err(&path, e))?;
        Ok(Self { file, path })
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        // Closing the handle releases the lock even if unlock fails.
        if let Err(e) = self.file.unlock() {
            tracing::debug!(path = %self.path.display(), "unlock failed: {}", e);
        }
    }
}

fn lock_path(registry: &Path) -> PathBuf {
    let mut name = registry.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    registry.with_file_name(name)
}

pub(super) fn load(path: &Path) -> Result<Vec<RemoteTarget>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }

    let file: RegistryFile = serde_json::from_str(&contents).map_err(|e| MirrorError::Corrupt {
        path: path.to_path_buf(),
        line: e.line(),
        message: e.to_string(),
    })?;
    if file.version > REGISTRY_FORMAT_VERSION {
        return Err(MirrorError::Corrupt {
            path: path.to_path_buf(),
            line: 1,
            message: format!("unsupported registry version {}", file.version),
        });
    }
    Ok(file.remotes)
}

pub(super) fn save(path: &Path, remotes: &[RemoteTarget]) -> Result<()> {
    let document = RegistryFile {
        version: REGISTRY_FORMAT_VERSION,
        remotes: remotes.to_vec(),
    };
    let content = serde_json::to_vec_pretty(&document)
        .map_err(|e| persistence_err(path, std::io::Error::other(e)))?;
    write_atomic(path, &content)
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| persistence_err(parent, e))?;
    }

    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id()
    );
    let temp_path = path.with_file_name(temp_name);

    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| persistence_err(&temp_path, e))?;
    temp_file
        .write_all(content)
        .map_err(|e| persistence_err(&temp_path, e))?;
    temp_file
        .sync_all()
        .map_err(|e| persistence_err(&temp_path, e))?;

    fs::rename(&temp_path, path).map_err(|e| persistence_err(path, e))
}
