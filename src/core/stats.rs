//! Summary rendering for finished sync runs

use std::time::Duration;

use super::config::{PATH_DISPLAY_WIDTH, REMOTE_NAME_DISPLAY_WIDTH};
use crate::sync::{Outcome, OverallStatus, SyncRun};

/// Counts and per-remote details pulled out of a [`SyncRun`] for display
#[derive(Debug, Clone, Default)]
pub struct SyncStatistics {
    pub pushed_remotes: usize,
    pub skipped_remotes: usize,
    pub failed_remotes: usize,
    /// Pushes that needed more than one attempt
    pub retried_remotes: usize,
    pub pushed: Vec<(String, String, String)>, // (remote_name, endpoint, detail)
    pub failed: Vec<(String, String, String)>, // (remote_name, endpoint, reason)
    pub skipped: Vec<(String, String, String)>, // (remote_name, endpoint, reason)
}

impl SyncStatistics {
    pub fn from_run(run: &SyncRun) -> Self {
        let mut stats = Self::default();
        for remote in run.outcomes() {
            if remote.attempts > 1 {
                stats.retried_remotes += 1;
            }
            match &remote.outcome {
                Outcome::Succeeded => {
                    stats.pushed_remotes += 1;
                    let detail = if remote.attempts > 1 {
                        format!("pushed after {} attempts", remote.attempts)
                    } else {
                        "pushed".to_string()
                    };
                    stats
                        .pushed
                        .push((remote.remote.clone(), remote.endpoint.clone(), detail));
                }
                Outcome::Failed(reason) => {
                    stats.failed_remotes += 1;
                    stats.failed.push((
                        remote.remote.clone(),
                        remote.endpoint.clone(),
                        reason.to_string(),
                    ));
                }
                Outcome::Skipped(reason) => {
                    stats.skipped_remotes += 1;
                    stats.skipped.push((
                        remote.remote.clone(),
                        remote.endpoint.clone(),
                        reason.to_string(),
                    ));
                }
            }
        }
        stats
    }

    /// One-line summary of the run
    pub fn generate_summary(&self, status: OverallStatus, duration: Duration) -> String {
        let duration_secs = duration.as_secs_f64();
        let icon = match status {
            OverallStatus::Success => "✅",
            OverallStatus::PartialFailure => "⚠️ ",
            OverallStatus::TotalFailure => "❌",
            OverallStatus::Aborted => "🛑",
        };

        let mut summary = format!(
            "{} {} in {:.1}s • {} pushed",
            icon,
            capitalize(status.text()),
            duration_secs,
            self.pushed_remotes
        );
        if self.skipped_remotes > 0 {
            summary.push_str(&format!(" • {} skipped", self.skipped_remotes));
        }
        if self.failed_remotes > 0 {
            summary.push_str(&format!(" • {} failed", self.failed_remotes));
        }
        if self.retried_remotes > 0 {
            summary.push_str(&format!(" • {} retried", self.retried_remotes));
        }
        summary
    }

    /// Lists every remote, grouped by outcome, problems first
    pub fn generate_detailed_summary(&self) -> String {
        let mut lines = Vec::new();

        // Failed remotes get priority
        if !self.failed.is_empty() {
            lines.push(format!("🔴 FAILED REMOTES ({})", self.failed.len()));
            push_tree(&mut lines, &self.failed);
            lines.push(String::new());
        }

        if !self.skipped.is_empty() {
            lines.push(format!("🟠 SKIPPED REMOTES ({})", self.skipped.len()));
            push_tree(&mut lines, &self.skipped);
            lines.push(String::new());
        }

        if !self.pushed.is_empty() {
            lines.push(format!("🟢 PUSHED REMOTES ({})", self.pushed.len()));
            push_tree(&mut lines, &self.pushed);
        }

        // Remove trailing blank line if it exists
        if lines.last() == Some(&String::new()) {
            lines.pop();
        }

        lines.join("\n")
    }

    /// One line per remote in run order, for `--quiet` output
    pub fn generate_remote_lines(run: &SyncRun) -> String {
        let name_width = run
            .outcomes()
            .iter()
            .map(|o| o.remote.len())
            .max()
            .unwrap_or(0);
        run.outcomes()
            .iter()
            .map(|o| {
                format!(
                    "{} {:width$} {}",
                    o.outcome.symbol(),
                    o.remote,
                    o.outcome,
                    width = name_width
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn push_tree(lines: &mut Vec<String>, entries: &[(String, String, String)]) {
    for (i, (name, endpoint, reason)) in entries.iter().enumerate() {
        let tree_char = if i == entries.len() - 1 { "└─" } else { "├─" };
        let short_endpoint = crate::utils::shorten_path(endpoint, PATH_DISPLAY_WIDTH);
        lines.push(format!(
            "   {} {:name_w$} {:path_w$} # {}",
            tree_char,
            name,
            short_endpoint,
            reason,
            name_w = REMOTE_NAME_DISPLAY_WIDTH,
            path_w = PATH_DISPLAY_WIDTH
        ));
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
