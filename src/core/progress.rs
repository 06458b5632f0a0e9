//! Progress bars for sync runs

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;

use super::config::{PROGRESS_CHARS, PROGRESS_TEMPLATE};
use crate::probe::ProbeResult;
use crate::registry::RemoteTarget;
use crate::sync::{Outcome, SyncObserver};

/// One spinner-less status line per remote, updated as the run progresses.
pub struct ProgressObserver {
    multi_progress: MultiProgress,
    bars: HashMap<String, ProgressBar>,
    name_width: usize,
}

impl ProgressObserver {
    pub fn new(targets: &[RemoteTarget]) -> Result<Self> {
        Self::with_draw_target(targets, ProgressDrawTarget::stdout())
    }

    /// An observer that tracks state but draws nothing
    pub fn hidden(targets: &[RemoteTarget]) -> Result<Self> {
        Self::with_draw_target(targets, ProgressDrawTarget::hidden())
    }

    fn with_draw_target(targets: &[RemoteTarget], target: ProgressDrawTarget) -> Result<Self> {
        let multi_progress = MultiProgress::with_draw_target(target);
        let style = create_progress_style()?;
        let name_width = targets.iter().map(|t| t.name.len()).max().unwrap_or(0);

        let bars = targets
            .iter()
            .map(|t| {
                let pb = create_progress_bar(&multi_progress, &style, &t.name, name_width);
                (t.name.clone(), pb)
            })
            .collect();

        Ok(Self {
            multi_progress,
            bars,
            name_width,
        })
    }

    /// Current message shown for a remote
    pub fn message(&self, remote: &str) -> Option<String> {
        self.bars.get(remote).map(|pb| pb.message().to_string())
    }

    pub fn clear(&self) {
        // Clearing can only fail if the terminal went away.
        let _ = self.multi_progress.clear();
    }

    fn update(&self, remote: &str, symbol: &str, message: String) {
        if let Some(pb) = self.bars.get(remote) {
            pb.set_prefix(format!("{} {:width$}", symbol, remote, width = self.name_width));
            pb.set_message(message);
        }
    }
}

impl SyncObserver for ProgressObserver {
    fn on_probe_started(&self, remote: &str) {
        self.update(remote, "🟡", "probing...".to_string());
    }

    fn on_probe_finished(&self, remote: &str, result: &ProbeResult) {
        let message = match result {
            ProbeResult::Reachable => "reachable".to_string(),
            ProbeResult::Unreachable(reason) => format!("unreachable: {reason}"),
            ProbeResult::Timeout => "probe timed out".to_string(),
        };
        self.update(remote, "🟡", message);
    }

    fn on_push_attempt(&self, remote: &str, attempt: u32) {
        let message = if attempt <= 1 {
            "pushing...".to_string()
        } else {
            format!("pushing (attempt {attempt})...")
        };
        self.update(remote, "🟡", message);
    }

    fn on_outcome(&self, remote: &str, outcome: &Outcome) {
        self.update(remote, outcome.symbol(), outcome.to_string());
        if let Some(pb) = self.bars.get(remote) {
            pb.finish();
        }
    }
}

/// Creates and configures a progress bar for a remote
pub(crate) fn create_progress_bar(
    multi: &MultiProgress,
    style: &ProgressStyle,
    remote_name: &str,
    name_width: usize,
) -> ProgressBar {
    let pb = multi.add(ProgressBar::new(1));
    pb.set_style(style.clone());
    pb.set_prefix(format!("🟡 {:width$}", remote_name, width = name_width));
    pb.set_message("waiting...");
    pb
}

/// Creates a progress bar style configuration
pub(crate) fn create_progress_style() -> Result<ProgressStyle> {
    Ok(ProgressStyle::default_bar()
        .template(PROGRESS_TEMPLATE)?
        .progress_chars(PROGRESS_CHARS))
}
