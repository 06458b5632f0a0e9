//! One handler per CLI command
//!
//! Handlers return `anyhow::Result` and print user-facing output; the
//! non-printing halves (`add_remote`, `execute_sync`, ...) are what tests drive.

pub mod audit;
pub mod context;
pub mod integrity;
pub mod remote;
pub mod sync;

pub use context::MirrorContext;
