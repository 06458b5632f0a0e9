//! sync-all: probe and push the local tree to every registered remote
//!
//! After the run finishes its record is appended to the audit log, remotes
//! that answered their probe get a fresh `last_verified_at`, and (unless
//! disabled) an integrity record of the pushed tree is stored alongside.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::context::MirrorContext;
use crate::audit::AuditEvent;
use crate::core::{resolve_concurrency, set_terminal_title, set_terminal_title_and_flush};
use crate::core::{ProgressObserver, Settings, SyncStatistics};
use crate::error::MirrorError;
use crate::git::{GitProber, GitPusher};
use crate::integrity::{record_integrity, IntegrityRecord};
use crate::probe::Prober;
use crate::registry::RemoteRegistry;
use crate::sync::{
    CancelToken, DispatchOptions, OverallStatus, Pusher, SyncDispatcher, SyncObserver, SyncRun,
};

/// Command-line overrides for one sync run
#[derive(Debug, Clone, Default)]
pub struct SyncArgs {
    /// Per-attempt push timeout, overriding the configured one
    pub timeout_secs: Option<u64>,
    pub max_concurrency: Option<usize>,
    pub no_verify: bool,
    pub json: bool,
    pub quiet: bool,
}

/// What a sync run produced
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run: SyncRun,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity: Option<IntegrityRecord>,
}

/// Builds dispatcher options from settings, with CLI overrides applied
pub fn dispatch_options(settings: &Settings, args: &SyncArgs) -> DispatchOptions {
    let push_timeout_secs = args
        .timeout_secs
        .filter(|secs| *secs > 0)
        .unwrap_or(settings.push_timeout_secs);
    DispatchOptions {
        max_concurrency: resolve_concurrency(args.max_concurrency, settings),
        probe_timeout: Duration::from_secs(settings.probe_timeout_secs),
        push_timeout: Duration::from_secs(push_timeout_secs),
        retry: settings.retry.clone(),
        run_deadline: settings.run_deadline_secs.map(Duration::from_secs),
    }
}

/// Runs one sync against every remote in `registry` and persists the results.
///
/// `registry` is only read for its targets and is released before the run,
/// so other commands can change the registry while pushes are in flight.
/// Fails only for an empty registry or a storage failure; per-remote
/// problems are reported in the returned run.
pub async fn execute_sync(
    ctx: &MirrorContext,
    registry: RemoteRegistry,
    prober: Arc<dyn Prober>,
    pusher: Arc<dyn Pusher>,
    args: &SyncArgs,
    observer: Option<Arc<dyn SyncObserver>>,
    cancel: &CancelToken,
) -> Result<SyncReport> {
    if registry.is_empty() {
        return Err(MirrorError::NoRemotes.into());
    }
    let targets = registry.list().to_vec();
    drop(registry);
    // Open before running so an unwritable log fails fast.
    let audit = ctx.open_audit_log()?;

    let options = dispatch_options(ctx.settings(), args);
    let mut dispatcher = SyncDispatcher::new(prober, pusher, options);
    if let Some(observer) = observer {
        dispatcher = dispatcher.with_observer(observer);
    }
    let run = dispatcher.run(&targets, ctx.root(), cancel).await;

    audit.append(AuditEvent::Sync(run.clone()))?;

    let mut registry = ctx.open_registry()?;
    registry.record_verified(&run);
    registry.save()?;

    let wants_integrity = !args.no_verify
        && run.overall_status() != OverallStatus::Aborted
        && run.count(|o| o.is_success()) > 0;
    let integrity = if wants_integrity {
        let excludes = &ctx.settings().excludes;
        match record_integrity(ctx.root(), excludes, ctx.paths().state_dir()).await {
            Ok(record) => {
                audit.append(AuditEvent::Integrity(record.clone()))?;
                Some(record)
            }
            Err(e) if e.is_validation() => return Err(e.into()),
            Err(e) => {
                tracing::warn!("Could not hash the pushed tree: {}", e);
                None
            }
        }
    } else {
        None
    };

    Ok(SyncReport { run, integrity })
}

/// Handles the sync-all command, returning the run's overall status
pub async fn handle_sync_all(
    ctx: &MirrorContext,
    args: SyncArgs,
    cancel: CancelToken,
) -> Result<OverallStatus> {
    let registry = ctx.read_registry()?;
    if registry.is_empty() {
        return Err(MirrorError::NoRemotes.into());
    }

    let interactive = !args.json && !args.quiet;
    if interactive {
        // Set terminal title to indicate mirror is running
        set_terminal_title("🚀 mirror");
        let remote_word = if registry.len() == 1 { "remote" } else { "remotes" };
        println!(
            "🚀 Mirroring {} to {} {}",
            ctx.root().display(),
            registry.len(),
            remote_word
        );
        println!();
    }

    let progress = if interactive {
        Some(Arc::new(ProgressObserver::new(registry.list())?))
    } else {
        None
    };
    let observer = progress
        .clone()
        .map(|progress| progress as Arc<dyn SyncObserver>);

    let settings = ctx.settings();
    let prober: Arc<dyn Prober> = Arc::new(GitProber::new(ctx.root()));
    let pusher: Arc<dyn Pusher> = Arc::new(GitPusher::new(
        settings.refspec.clone(),
        settings.push_tags,
        dispatch_options(settings, &args).push_timeout,
    ));

    let report = execute_sync(
        ctx,
        registry,
        prober,
        pusher,
        &args,
        observer,
        &cancel,
    )
    .await;

    let report = match report {
        Ok(report) => report,
        Err(e) => {
            // Half-drawn bars would bury the error message
            if let Some(progress) = &progress {
                progress.clear();
            }
            set_terminal_title_and_flush("❌ mirror");
            return Err(e);
        }
    };
    let status = report.run.overall_status();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if args.quiet {
        println!("{}", SyncStatistics::generate_remote_lines(&report.run));
    } else {
        print_report(&report);
    }

    let title = if status == OverallStatus::Success { "✅ mirror" } else { "⚠️ mirror" };
    set_terminal_title_and_flush(title);
    Ok(status)
}

fn print_report(report: &SyncReport) {
    let run = &report.run;
    let stats = SyncStatistics::from_run(run);
    let duration = run.duration().to_std().unwrap_or_default();

    println!();
    println!("{}", stats.generate_summary(run.overall_status(), duration));
    println!();
    println!("{}", stats.generate_detailed_summary());
    if let Some(record) = &report.integrity {
        println!();
        println!(
            "🔒 Tree hash {} ({} files @ {})",
            record.tree_hash, record.file_count, record.source_ref
        );
    }
}
