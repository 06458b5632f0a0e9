//! Configuration constants and settings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MirrorError, Result};
use crate::sync::RetryPolicy;

// Default concurrency cap to prevent overwhelming hosting providers' concurrent request limits
pub const GIT_CONCURRENT_CAP: usize = 12;

pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_PUSH_TIMEOUT_SECS: u64 = 180;
pub const DEFAULT_REFSPEC: &str = "HEAD";

// State layout
pub const STATE_DIR_NAME: &str = ".mirror";
pub const REGISTRY_FILE_NAME: &str = "remotes.json";
pub const AUDIT_FILE_NAME: &str = "audit.jsonl";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const APP_CONFIG_DIR: &str = "goobits-mirror";

// Environment overrides
pub const CONCURRENCY_ENV: &str = "MIRROR_CONCURRENCY";
pub const STATE_DIR_ENV: &str = "MIRROR_HOME";

// Progress bar configuration
pub const PROGRESS_TEMPLATE: &str = "{prefix:.bold} {wide_msg}";
pub const PROGRESS_CHARS: &str = "##-";

// Display formatting constants
pub const PATH_DISPLAY_WIDTH: usize = 30;
pub const REMOTE_NAME_DISPLAY_WIDTH: usize = 20;

/// Tunables read from `config.toml`
///
/// Every field is optional in the file; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub probe_timeout_secs: u64,
    pub push_timeout_secs: u64,
    pub run_deadline_secs: Option<u64>,
    pub max_concurrency: Option<usize>,
    pub refspec: String,
    pub push_tags: bool,
    /// Extra exclusion globs applied to every integrity hash
    pub excludes: Vec<String>,
    pub retry: RetryPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            push_timeout_secs: DEFAULT_PUSH_TIMEOUT_SECS,
            run_deadline_secs: None,
            max_concurrency: None,
            refspec: DEFAULT_REFSPEC.to_string(),
            push_tags: false,
            excludes: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }
}

/// A config file where every field may be absent, used for layering.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PartialSettings {
    probe_timeout_secs: Option<u64>,
    push_timeout_secs: Option<u64>,
    run_deadline_secs: Option<u64>,
    max_concurrency: Option<usize>,
    refspec: Option<String>,
    push_tags: Option<bool>,
    excludes: Option<Vec<String>>,
    retry: Option<RetryPolicy>,
}

impl Settings {
    /// Loads the global config file, then overlays `local` (the state
    /// directory's config) on top. Missing files are not an error.
    pub fn load(local: &Path) -> Result<Self> {
        let mut settings = Settings::default();
        if let Some(global) = global_config_path() {
            settings.overlay_file(&global)?;
        }
        settings.overlay_file(local)?;
        settings.validate(local)?;
        Ok(settings)
    }

    /// Parses a single file on top of the defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut settings = Settings::default();
        settings.overlay_file(path)?;
        settings.validate(path)?;
        Ok(settings)
    }

    fn overlay_file(&mut self, path: &Path) -> Result<()> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(crate::error::io_err(path, e)),
        };
        let partial: PartialSettings =
            toml::from_str(&contents).map_err(|e| MirrorError::InvalidConfig {
                path: path.to_path_buf(),
                reason: e.message().to_string(),
            })?;
        tracing::debug!(path = %path.display(), "Loaded settings");
        self.apply(partial);
        Ok(())
    }

    fn apply(&mut self, partial: PartialSettings) {
        if let Some(v) = partial.probe_timeout_secs {
            self.probe_timeout_secs = v;
        }
        if let Some(v) = partial.push_timeout_secs {
            self.push_timeout_secs = v;
        }
        if partial.run_deadline_secs.is_some() {
            self.run_deadline_secs = partial.run_deadline_secs;
        }
        if partial.max_concurrency.is_some() {
            self.max_concurrency = partial.max_concurrency;
        }
        if let Some(v) = partial.refspec {
            self.refspec = v;
        }
        if let Some(v) = partial.push_tags {
            self.push_tags = v;
        }
        if let Some(v) = partial.excludes {
            self.excludes = v;
        }
        if let Some(v) = partial.retry {
            self.retry = v;
        }
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |reason: &str| MirrorError::InvalidConfig {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        if self.probe_timeout_secs == 0 {
            return Err(invalid("probe_timeout_secs must be at least 1"));
        }
        if self.push_timeout_secs == 0 {
            return Err(invalid("push_timeout_secs must be at least 1"));
        }
        if self.max_concurrency == Some(0) {
            return Err(invalid("max_concurrency must be at least 1"));
        }
        if self.refspec.trim().is_empty() {
            return Err(invalid("refspec must not be empty"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        if !(self.retry.multiplier >= 1.0) {
            return Err(invalid("retry.multiplier must be at least 1.0"));
        }
        Ok(())
    }
}

/// `~/.config/goobits-mirror/config.toml` or the platform equivalent
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_CONFIG_DIR).join(CONFIG_FILE_NAME))
}

/// Determines the concurrency limit for a sync run
///
/// Priority order:
/// 1. --max-concurrency N flag → N
/// 2. MIRROR_CONCURRENCY env var → N
/// 3. max_concurrency from config.toml → N
/// 4. Smart default → min(CPU_CORES + 2, 12)
pub fn resolve_concurrency(flag: Option<usize>, settings: &Settings) -> usize {
    if let Some(n) = flag {
        return n.max(1); // Ensure at least 1
    }

    if let Ok(env_concurrency) = std::env::var(CONCURRENCY_ENV) {
        match env_concurrency.parse::<usize>() {
            Ok(n) if n > 0 => return n,
            _ => tracing::warn!(
                value = %env_concurrency,
                "Ignoring invalid {} value", CONCURRENCY_ENV
            ),
        }
    }

    if let Some(n) = settings.max_concurrency {
        return n.max(1);
    }

    // Smart default: CPU cores + 2, capped at 12
    let cpu_count = num_cpus::get();
    (cpu_count + 2).min(GIT_CONCURRENT_CAP)
}
