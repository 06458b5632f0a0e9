//! # goobits-mirror
//!
//! `goobits-mirror` pushes one local working tree to many git remotes at once
//! and keeps a tamper-evident record of every run. It powers the `mirror` CLI.
//!
//! ## Core Features
//!
//! - **Remote Registry**: Named, validated push destinations persisted as JSON.
//! - **Concurrent Sync**: Probe every remote, then push to the reachable ones
//!   under a bounded worker pool, with per-remote retry and cancellation.
//! - **Integrity Hashing**: A deterministic SHA-256 digest of the tree, computed
//!   in parallel with `rayon`, honouring gitignore-style exclusions.
//! - **Audit Log**: Append-only, hash-chained JSON Lines history of runs,
//!   integrity records and registry changes.
//!
//! ## Example
//!
//! ```rust,no_run
//! use goobits_mirror::integrity::compute_tree_hash;
//! use std::path::Path;
//!
//! let tree = compute_tree_hash(Path::new("."), &["target/"]).unwrap();
//! println!("{} ({} files)", tree.hash, tree.file_count);
//! ```

pub mod audit;
pub mod commands;
pub mod core;
pub mod error;
pub mod git;
pub mod integrity;
pub mod probe;
pub mod registry;
pub mod sync;
pub mod utils;

pub use error::{MirrorError, Result};
