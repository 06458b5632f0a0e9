//! Audit commands: audit-log, verify-audit, rebuild-registry

use anyhow::Result;
use std::collections::VecDeque;

use super::context::MirrorContext;
use crate::audit::{AuditEntry, AuditEvent, AuditFilter, AuditLog, EventKind, RemoteChange};
use crate::error::MirrorError;
use crate::registry::RemoteRegistry;

#[derive(Debug, Clone, Default)]
pub struct AuditLogArgs {
    pub kind: Option<EventKind>,
    pub remote: Option<String>,
    /// Show only the most recent N matching entries
    pub limit: Option<usize>,
    pub json: bool,
}

/// Matching entries in log order, keeping only the newest `limit`.
/// Unreadable lines are skipped with a warning.
pub fn read_entries(
    log: &AuditLog,
    filter: AuditFilter,
    limit: Option<usize>,
) -> Result<Vec<AuditEntry>> {
    let mut entries = VecDeque::new();
    for item in log.query(filter).iter() {
        match item {
            Ok(entry) => {
                entries.push_back(entry);
                if limit.is_some_and(|n| entries.len() > n) {
                    entries.pop_front();
                }
            }
            Err(MirrorError::Corrupt { line, message, .. }) => {
                tracing::warn!(line, "Skipping unreadable audit entry: {}", message);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(entries.into())
}

pub fn handle_audit_log(ctx: &MirrorContext, args: AuditLogArgs) -> Result<()> {
    let log = ctx.open_audit_log()?;

    let mut filter = AuditFilter::all();
    if let Some(kind) = args.kind {
        filter = filter.kind(kind);
    }
    if let Some(remote) = &args.remote {
        filter = filter.remote(remote.clone());
    }
    let entries = read_entries(&log, filter, args.limit)?;

    if args.json {
        for entry in &entries {
            println!("{}", serde_json::to_string(entry)?);
        }
        return Ok(());
    }

    if entries.is_empty() {
        println!("No matching audit entries.");
        return Ok(());
    }
    for entry in &entries {
        println!("{}", describe_entry(entry));
    }
    Ok(())
}

/// One-line human description of an entry
pub fn describe_entry(entry: &AuditEntry) -> String {
    let detail = match &entry.event {
        AuditEvent::Sync(run) => format!(
            "{} ({} pushed, {} skipped, {} failed)",
            run.overall_status().text(),
            run.count(|o| o.is_success()),
            run.count(|o| o.is_skipped()),
            run.count(|o| !o.is_success() && !o.is_skipped()),
        ),
        AuditEvent::Integrity(record) => format!(
            "{} ({} files @ {})",
            record.tree_hash, record.file_count, record.source_ref
        ),
        AuditEvent::Remote(RemoteChange::Added { target }) => {
            format!("added {} → {}", target.name, target.endpoint)
        }
        AuditEvent::Remote(RemoteChange::Replaced { target }) => {
            format!("replaced {} → {}", target.name, target.endpoint)
        }
        AuditEvent::Remote(RemoteChange::Removed { name }) => format!("removed {name}"),
    };
    format!(
        "#{:<5} {}  {:9}  {}",
        entry.seq,
        entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
        entry.event.kind().to_string(),
        detail
    )
}

/// Handles verify-audit. Returns whether the chain is intact.
pub fn handle_verify_audit(ctx: &MirrorContext) -> Result<bool> {
    let log = ctx.open_audit_log()?;
    let report = log.verify_chain()?;

    match &report.first_error {
        None => {
            println!("✅ Audit chain intact ({} entries)", report.entries);
            Ok(true)
        }
        Some(error) => {
            println!(
                "❌ Audit chain broken after {} valid entries: {}",
                report.entries, error
            );
            Ok(false)
        }
    }
}

/// Rebuilds the registry file from the remote changes in the audit log.
pub fn rebuild_registry(ctx: &MirrorContext) -> Result<RemoteRegistry> {
    let log = ctx.open_audit_log()?;
    let report = log.verify_chain()?;
    if let Some(error) = &report.first_error {
        tracing::warn!("Rebuilding from an audit log that fails verification: {}", error);
    }

    let entries = read_entries(&log, AuditFilter::all(), None)?;
    let mut registry = RemoteRegistry::replay(&entries).persist_to(ctx.paths().registry())?;
    registry.save()?;
    tracing::info!(remotes = registry.len(), "Rebuilt registry from audit log");
    Ok(registry)
}

pub fn handle_rebuild_registry(ctx: &MirrorContext) -> Result<()> {
    let registry = rebuild_registry(ctx)?;
    println!(
        "✅ Rebuilt {} with {} remote(s)",
        ctx.paths().registry().display(),
        registry.len()
    );
    Ok(())
}
