//! Common test utilities and helpers
#![allow(dead_code, unused_imports)]

pub mod fakes;
pub mod fixtures;
pub mod git;

pub use self::fakes::{ObservedEvent, RecordingObserver, ScriptedProber, ScriptedPusher};
pub use self::fixtures::{TestRepoBuilder, TestTree};
pub use self::git::{init_bare_repo, is_git_available, setup_git_repo};

use std::sync::{Mutex, MutexGuard};
use std::sync::OnceLock;

static TEST_MUTEX: OnceLock<Mutex<()>> = OnceLock::new();

/// Acquires a global lock for tests that modify process-wide state (like env vars)
pub fn lock_test() -> MutexGuard<'static, ()> {
    TEST_MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
