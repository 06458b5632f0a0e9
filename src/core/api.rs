//! Public API for the core module.
//!
//! This module provides the stable public API for core functionality including:
//! - Settings and state directory resolution
//! - Logging initialization
//! - Progress display and run summaries
//!
//! Internal implementation details are not exposed through this API.

// Configuration
pub use super::config::{global_config_path, resolve_concurrency, Settings};
pub use super::config::{
    AUDIT_FILE_NAME, CONCURRENCY_ENV, CONFIG_FILE_NAME, DEFAULT_PROBE_TIMEOUT_SECS,
    DEFAULT_PUSH_TIMEOUT_SECS, GIT_CONCURRENT_CAP, REGISTRY_FILE_NAME, STATE_DIR_ENV,
    STATE_DIR_NAME,
};
pub use super::paths::StatePaths;

// Logging
pub use super::logging::init as init_logging;

// Display
pub use super::progress::ProgressObserver;
pub use super::stats::SyncStatistics;

// Terminal utilities (re-exported from utils)
pub use crate::utils::{set_terminal_title, set_terminal_title_and_flush};
