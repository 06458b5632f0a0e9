//! Integrity hashing and integrity records

pub mod exclude;
pub mod hasher;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

pub use exclude::{ExcludeSet, BUILTIN_EXCLUDES};
pub use hasher::{combine, compute_tree_hash, hash_manifest, hash_tree, FileDigest, TreeHash};

/// Placeholder used when the tree is not under version control
pub const UNKNOWN_SOURCE_REF: &str = "unknown";

/// Proof of a tree's exact content at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityRecord {
    pub timestamp: DateTime<Utc>,
    pub tree_hash: String,
    pub source_ref: String,
    pub file_count: usize,
    pub root: PathBuf,
    #[serde(default)]
    pub excludes: Vec<String>,
}

impl IntegrityRecord {
    pub fn new(
        root: &Path,
        tree: TreeHash,
        source_ref: Option<String>,
        excludes: &[String],
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            tree_hash: tree.hash,
            source_ref: source_ref.unwrap_or_else(|| UNKNOWN_SOURCE_REF.to_string()),
            file_count: tree.file_count,
            root: root.to_path_buf(),
            excludes: excludes.to_vec(),
        }
    }

    /// Case-insensitive comparison against an expected digest.
    pub fn matches(&self, expected: &str) -> bool {
        self.tree_hash.eq_ignore_ascii_case(expected.trim())
    }
}

/// Hashes `root` off the async runtime and stamps it with the current git ref.
///
/// `state_dir` is always left out of the hash when it lies under `root`.
pub async fn record_integrity(
    root: &Path,
    excludes: &[String],
    state_dir: &Path,
) -> Result<IntegrityRecord> {
    let exclude_set = ExcludeSet::new(root, excludes)?.with_state_dir(root, state_dir);
    let hash_root = root.to_path_buf();
    let tree = tokio::task::spawn_blocking(move || hash_tree(&hash_root, &exclude_set))
        .await
        .map_err(|e| crate::error::io_err(root, std::io::Error::other(e)))??;

    let source_ref = crate::git::current_ref(root).await;
    let record = IntegrityRecord::new(root, tree, source_ref, excludes);
    tracing::info!(
        tree_hash = %record.tree_hash,
        files = record.file_count,
        source_ref = %record.source_ref,
        "computed tree hash"
    );
    Ok(record)
}
