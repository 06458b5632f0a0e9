//! Deterministic whole-tree hashing
//!
//! The tree hash is computed as:
//!
//! 1. walk every regular file and symlink under the root, skipping excluded paths
//! 2. SHA-256 each file's raw bytes (for symlinks: the link target text)
//! 3. sort the `(path, digest)` pairs by digest hex, then by path bytes
//! 4. SHA-256 the concatenation of `"<digest> <len>:<path>\n"` records
//!
//! Paths are relative to the root and always use `/` separators, so the
//! result does not depend on the platform or on directory enumeration order.
//! `<path>` is the raw encoded bytes of the name and `<len>` its byte length
//! in decimal, so a name containing newlines or digest-like text cannot
//! masquerade as another record.

use ignore::WalkBuilder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::exclude::ExcludeSet;
use crate::error::{io_err, MirrorError, Result};

/// Digest of one file in the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDigest {
    /// Display form of the relative path
    pub path: String,
    /// Exact bytes of the relative path, the form that is hashed
    pub raw_path: Vec<u8>,
    pub digest: String,
    pub symlink: bool,
}

impl FileDigest {
    fn record(&self) -> Vec<u8> {
        let mut record = Vec::with_capacity(self.digest.len() + self.raw_path.len() + 24);
        record.extend_from_slice(self.digest.as_bytes());
        record.extend_from_slice(format!(" {}:", self.raw_path.len()).as_bytes());
        record.extend_from_slice(&self.raw_path);
        record.push(b'\n');
        record
    }
}

/// Final tree hash plus the number of files it covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeHash {
    pub hash: String,
    pub file_count: usize,
}

enum EntryKind {
    File,
    Symlink,
}

/// Computes the tree hash of `root`, excluding built-ins plus `excludes`.
pub fn compute_tree_hash<S: AsRef<str>>(root: &Path, excludes: &[S]) -> Result<TreeHash> {
    hash_tree(root, &ExcludeSet::new(root, excludes)?)
}

/// Computes the tree hash of `root` with a prepared exclusion set.
pub fn hash_tree(root: &Path, excludes: &ExcludeSet) -> Result<TreeHash> {
    let manifest = hash_manifest(root, excludes)?;
    Ok(TreeHash {
        hash: combine(&manifest),
        file_count: manifest.len(),
    })
}

/// Per-file digests for every included file, in canonical order.
///
/// Files are hashed in parallel; the result is sorted afterwards so
/// scheduling never influences the order.
pub fn hash_manifest(root: &Path, excludes: &ExcludeSet) -> Result<Vec<FileDigest>> {
    let files = enumerate(root, excludes)?;
    tracing::debug!(root = %root.display(), files = files.len(), "hashing tree");

    let mut manifest = files
        .par_iter()
        .map(|(absolute, raw_path, kind)| -> Result<FileDigest> {
            let (digest, symlink) = match kind {
                EntryKind::File => (hash_file(absolute)?, false),
                EntryKind::Symlink => (hash_link(absolute)?, true),
            };
            Ok(FileDigest {
                path: String::from_utf8_lossy(raw_path).into_owned(),
                raw_path: raw_path.clone(),
                digest,
                symlink,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    sort_canonical(&mut manifest);
    Ok(manifest)
}

/// Hashes an already-computed manifest into the final tree hash.
///
/// The manifest is re-sorted first, so callers may pass entries in any order.
pub fn combine(entries: &[FileDigest]) -> String {
    let mut sorted = entries.to_vec();
    sort_canonical(&mut sorted);

    let mut hasher = Sha256::new();
    for entry in &sorted {
        hasher.update(entry.record());
    }
    format!("{:x}", hasher.finalize())
}

fn sort_canonical(entries: &mut [FileDigest]) {
    entries.sort_by(|a, b| a.digest.cmp(&b.digest).then_with(|| a.raw_path.cmp(&b.raw_path)));
}

fn enumerate(root: &Path, excludes: &ExcludeSet) -> Result<Vec<(PathBuf, Vec<u8>, EntryKind)>> {
    let metadata = fs::metadata(root).map_err(|e| io_err(root, e))?;
    if !metadata.is_dir() {
        return Err(io_err(
            root,
            io::Error::new(io::ErrorKind::InvalidInput, "tree root is not a directory"),
        ));
    }

    let filter_root = root.to_path_buf();
    let filter_excludes = Arc::new(excludes.clone());
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            let Ok(relative) = entry.path().strip_prefix(&filter_root) else {
                return true;
            };
            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            !filter_excludes.is_excluded(relative, is_dir)
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| walk_err(root, e))?;
        if entry.depth() == 0 {
            continue;
        }
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            // Directories are implied by their files; sockets and fifos have no content.
            continue;
        };

        let relative = entry
            .path()
            .strip_prefix(root)
            .map(normalize)
            .unwrap_or_else(|_| normalize(entry.path()));
        files.push((entry.path().to_path_buf(), relative, kind));
    }
    Ok(files)
}

/// Relative path bytes with `/` separators regardless of platform
fn normalize(path: &Path) -> Vec<u8> {
    let mut bytes = Vec::new();
    for (i, component) in path.components().enumerate() {
        if i > 0 {
            bytes.push(b'/');
        }
        bytes.extend_from_slice(component.as_os_str().as_encoded_bytes());
    }
    bytes
}

fn hash_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| io_err(path, e))?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn hash_link(path: &Path) -> Result<String> {
    let target = fs::read_link(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    hasher.update(target.as_os_str().as_encoded_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

fn walk_err(root: &Path, err: ignore::Error) -> MirrorError {
    let path = match &err {
        ignore::Error::WithPath { path, .. } => path.clone(),
        _ => root.to_path_buf(),
    };
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::other("directory walk failed"));
    io_err(path, source)
}
