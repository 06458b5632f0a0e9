//! Sync run records and the outcome model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::probe::ProbeResult;
use crate::registry::RemoteTarget;

/// Why a remote was never attempted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    Unreachable(String),
    Timeout,
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unreachable(reason) => write!(f, "unreachable: {reason}"),
            SkipReason::Timeout => write!(f, "timed out"),
            SkipReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Why a push failed after its retries were used up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailReason {
    Transport(String),
    Timeout,
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailReason::Transport(reason) => write!(f, "{reason}"),
            FailReason::Timeout => write!(f, "timed out"),
        }
    }
}

/// Terminal result for one remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed(FailReason),
    Skipped(SkipReason),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped(_))
    }

    /// Error classification, `None` for successes and cancellations
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Outcome::Succeeded | Outcome::Skipped(SkipReason::Cancelled) => None,
            Outcome::Skipped(SkipReason::Unreachable(_)) => Some(ErrorKind::Connectivity),
            Outcome::Failed(FailReason::Transport(_)) => Some(ErrorKind::Transport),
            Outcome::Skipped(SkipReason::Timeout) | Outcome::Failed(FailReason::Timeout) => {
                Some(ErrorKind::Timeout)
            }
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Outcome::Succeeded => "🟢",
            Outcome::Failed(_) => "🔴",
            Outcome::Skipped(_) => "🟠",
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Outcome::Succeeded => "pushed",
            Outcome::Failed(_) => "failed",
            Outcome::Skipped(_) => "skipped",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Succeeded => write!(f, "succeeded"),
            Outcome::Failed(reason) => write!(f, "failed ({reason})"),
            Outcome::Skipped(reason) => write!(f, "skipped ({reason})"),
        }
    }
}

/// Aggregate status of a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Success,
    PartialFailure,
    TotalFailure,
    Aborted,
}

impl OverallStatus {
    /// Derives the run status from per-remote outcomes.
    ///
    /// - cancelled runs are `Aborted`, whatever completed before
    /// - `Success` only if every targeted remote succeeded
    /// - `TotalFailure` if nothing succeeded
    /// - `PartialFailure` otherwise
    pub fn derive<'a>(outcomes: impl IntoIterator<Item = &'a Outcome>, cancelled: bool) -> Self {
        if cancelled {
            return OverallStatus::Aborted;
        }
        let (mut succeeded, mut total) = (0usize, 0usize);
        for outcome in outcomes {
            total += 1;
            if outcome.is_success() {
                succeeded += 1;
            }
        }
        if succeeded == total {
            OverallStatus::Success
        } else if succeeded == 0 {
            OverallStatus::TotalFailure
        } else {
            OverallStatus::PartialFailure
        }
    }

    /// Process exit code for the `sync-all` command
    pub fn exit_code(&self) -> i32 {
        match self {
            OverallStatus::Success => 0,
            OverallStatus::TotalFailure => 1,
            OverallStatus::PartialFailure => 2,
            OverallStatus::Aborted => 130,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            OverallStatus::Success => "success",
            OverallStatus::PartialFailure => "partial failure",
            OverallStatus::TotalFailure => "total failure",
            OverallStatus::Aborted => "aborted",
        }
    }
}

/// One remote's line in a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOutcome {
    pub remote: String,
    pub endpoint: String,
    pub outcome: Outcome,
    /// Probe result, absent if the run stopped before the probe finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeResult>,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

impl RemoteOutcome {
    pub(crate) fn new(target: &RemoteTarget, outcome: Outcome) -> Self {
        Self {
            remote: target.name.clone(),
            endpoint: target.endpoint.clone(),
            outcome,
            probe: None,
            attempts: 0,
            elapsed_ms: 0,
        }
    }
}

/// A finished sync run. Immutable: only the dispatcher can build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    run_id: Uuid,
    root: PathBuf,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    outcomes: Vec<RemoteOutcome>,
    overall_status: OverallStatus,
}

impl SyncRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    /// Per-remote outcomes, in the order the targets were given
    pub fn outcomes(&self) -> &[RemoteOutcome] {
        &self.outcomes
    }

    pub fn outcome(&self, remote: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|o| o.remote == remote)
            .map(|o| &o.outcome)
    }

    pub fn overall_status(&self) -> OverallStatus {
        self.overall_status
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Remotes whose probe succeeded during this run
    pub fn verified_remotes(&self) -> impl Iterator<Item = &RemoteOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.probe, Some(ProbeResult::Reachable)))
    }

    pub fn involves(&self, remote: &str) -> bool {
        self.outcomes.iter().any(|o| o.remote == remote)
    }

    pub fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(&o.outcome)).count()
    }
}

/// A run while the dispatcher still owns it
pub(crate) struct InFlightRun {
    run_id: Uuid,
    root: PathBuf,
    started_at: DateTime<Utc>,
}

impl InFlightRun {
    pub(crate) fn start(root: &Path) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            root: root.to_path_buf(),
            started_at: Utc::now(),
        }
    }

    pub(crate) fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Seals the run: stamps `finished_at` and derives the overall status.
    pub(crate) fn finish(self, outcomes: Vec<RemoteOutcome>, cancelled: bool) -> SyncRun {
        let overall_status = OverallStatus::derive(outcomes.iter().map(|o| &o.outcome), cancelled);
        SyncRun {
            run_id: self.run_id,
            root: self.root,
            started_at: self.started_at,
            finished_at: Utc::now(),
            outcomes,
            overall_status,
        }
    }
}
