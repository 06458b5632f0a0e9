//! Git-backed [`Prober`] and [`Pusher`]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::operations::{clean_error_message, is_transient_error, ls_remote, push, push_tags};
use crate::probe::{ProbeResult, Prober};
use crate::registry::RemoteTarget;
use crate::sync::{PushFailure, Pusher};

/// Probes remotes with `git ls-remote`
#[derive(Debug, Clone)]
pub struct GitProber {
    work_dir: PathBuf,
}

impl GitProber {
    /// `work_dir` is only used as the working directory of the git process.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }
}

#[async_trait]
impl Prober for GitProber {
    async fn probe(&self, target: &RemoteTarget, timeout: Duration) -> ProbeResult {
        match ls_remote(&self.work_dir, &target.endpoint, timeout).await {
            Ok((true, _, _)) => ProbeResult::Reachable,
            Ok((false, _, stderr)) => ProbeResult::Unreachable(clean_error_message(&stderr)),
            Err(e) => {
                let message = e.to_string();
                if message.contains("timed out") {
                    ProbeResult::Timeout
                } else {
                    ProbeResult::Unreachable(clean_error_message(&message))
                }
            }
        }
    }
}

/// Pushes the local work tree's history with `git push`
#[derive(Debug, Clone)]
pub struct GitPusher {
    refspec: String,
    push_tags: bool,
    timeout: Duration,
}

impl GitPusher {
    /// `timeout` bounds each git invocation; the dispatcher applies its own
    /// per-attempt bound on top.
    pub fn new(refspec: impl Into<String>, push_tags: bool, timeout: Duration) -> Self {
        Self {
            refspec: refspec.into(),
            push_tags,
            timeout,
        }
    }

    async fn push_once(&self, endpoint: &str, local_root: &Path) -> Result<(), PushFailure> {
        classify(push(local_root, endpoint, &self.refspec, self.timeout).await)?;
        if self.push_tags {
            classify(push_tags(local_root, endpoint, self.timeout).await)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Pusher for GitPusher {
    async fn push(&self, target: &RemoteTarget, local_root: &Path) -> Result<(), PushFailure> {
        tracing::debug!(remote = %target.name, refspec = %self.refspec, "git push");
        self.push_once(&target.endpoint, local_root).await
    }
}

fn classify(result: anyhow::Result<(bool, String, String)>) -> Result<(), PushFailure> {
    let raw = match result {
        Ok((true, _, _)) => return Ok(()),
        Ok((false, stdout, stderr)) => {
            // --porcelain reports ref rejections on stdout
            if stderr.is_empty() {
                stdout
            } else {
                format!("{stderr}\n{stdout}")
            }
        }
        Err(e) => e.to_string(),
    };

    let reason = clean_error_message(&raw);
    if is_transient_error(&raw) {
        Err(PushFailure::retryable(reason))
    } else {
        Err(PushFailure::permanent(reason))
    }
}
