//! Registry commands: add-remote, remove-remote, list-remotes

use anyhow::Result;

use super::context::MirrorContext;
use crate::audit::{AuditEvent, RemoteChange};
use crate::core::config::{PATH_DISPLAY_WIDTH, REMOTE_NAME_DISPLAY_WIDTH};
use crate::registry::RemoteTarget;

/// Adds (or with `replace`, overwrites) a remote.
///
/// The change is appended to the audit log before the registry file is
/// rewritten, so the log is always at least as new as the registry.
pub fn add_remote(
    ctx: &MirrorContext,
    name: &str,
    endpoint: &str,
    replace: bool,
) -> Result<RemoteChange> {
    let mut registry = ctx.open_registry()?;
    let existed = registry.contains(name);
    let target = registry.add(name, endpoint, replace)?;

    let change = if existed {
        RemoteChange::Replaced { target }
    } else {
        RemoteChange::Added { target }
    };
    ctx.open_audit_log()?
        .append(AuditEvent::Remote(change.clone()))?;
    registry.save()?;

    tracing::info!(remote = name, endpoint, replaced = existed, "Registered remote");
    Ok(change)
}

pub fn remove_remote(ctx: &MirrorContext, name: &str) -> Result<RemoteTarget> {
    let mut registry = ctx.open_registry()?;
    let removed = registry.remove(name)?;

    ctx.open_audit_log()?
        .append(AuditEvent::Remote(RemoteChange::Removed {
            name: removed.name.clone(),
        }))?;
    registry.save()?;

    tracing::info!(remote = name, "Removed remote");
    Ok(removed)
}

pub fn handle_add_remote(
    ctx: &MirrorContext,
    name: &str,
    endpoint: &str,
    replace: bool,
) -> Result<()> {
    match add_remote(ctx, name, endpoint, replace)? {
        RemoteChange::Replaced { target } => {
            println!("🔄 Replaced remote '{}' → {}", target.name, target.endpoint)
        }
        RemoteChange::Added { target } => {
            println!("✅ Added remote '{}' → {}", target.name, target.endpoint)
        }
        RemoteChange::Removed { .. } => {}
    }
    Ok(())
}

pub fn handle_remove_remote(ctx: &MirrorContext, name: &str) -> Result<()> {
    let removed = remove_remote(ctx, name)?;
    println!("🗑️  Removed remote '{}' ({})", removed.name, removed.endpoint);
    Ok(())
}

pub fn handle_list_remotes(ctx: &MirrorContext, json: bool) -> Result<()> {
    let registry = ctx.read_registry()?;

    if json {
        println!("{}", serde_json::to_string_pretty(registry.list())?);
        return Ok(());
    }

    if registry.is_empty() {
        println!("No remotes registered. Add one with `mirror add-remote <name> <endpoint>`.");
        return Ok(());
    }

    println!("📡 REMOTES ({})", registry.len());
    for line in render_remote_lines(registry.list()) {
        println!("{line}");
    }
    Ok(())
}

fn render_remote_lines(remotes: &[RemoteTarget]) -> Vec<String> {
    remotes
        .iter()
        .enumerate()
        .map(|(i, remote)| {
            let tree_char = if i == remotes.len() - 1 { "└─" } else { "├─" };
            let verified = remote
                .last_verified_at
                .map(|at| format!("verified {}", at.format("%Y-%m-%d %H:%M UTC")))
                .unwrap_or_else(|| "never verified".to_string());
            format!(
                "   {} {:name_w$} {:path_w$} # {}",
                tree_char,
                remote.name,
                crate::utils::shorten_path(&remote.endpoint, PATH_DISPLAY_WIDTH),
                verified,
                name_w = REMOTE_NAME_DISPLAY_WIDTH,
                path_w = PATH_DISPLAY_WIDTH
            )
        })
        .collect()
}
