//! verify-integrity: hash the local tree and record the result

use anyhow::Result;

use super::context::MirrorContext;
use crate::audit::AuditEvent;
use crate::integrity::{record_integrity, IntegrityRecord};

#[derive(Debug, Clone, Default)]
pub struct VerifyArgs {
    /// Extra exclusion globs on top of the configured ones
    pub excludes: Vec<String>,
    /// Digest the tree is expected to have
    pub expect: Option<String>,
    pub json: bool,
}

/// Hashes the tree, appends the record to the audit log and returns it.
pub async fn verify_integrity(ctx: &MirrorContext, args: &VerifyArgs) -> Result<IntegrityRecord> {
    let mut excludes = ctx.settings().excludes.clone();
    excludes.extend(args.excludes.iter().cloned());

    let record = record_integrity(ctx.root(), &excludes, ctx.paths().state_dir()).await?;
    ctx.open_audit_log()?
        .append(AuditEvent::Integrity(record.clone()))?;
    Ok(record)
}

/// Handles the verify-integrity command. Returns `false` when `--expect` was
/// given and the digest differs.
pub async fn handle_verify_integrity(ctx: &MirrorContext, args: VerifyArgs) -> Result<bool> {
    let record = verify_integrity(ctx, &args).await?;
    let matches = args.expect.as_deref().map(|e| record.matches(e));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("🔒 {}", record.tree_hash);
        println!("   ├─ files   {}", record.file_count);
        println!("   ├─ ref     {}", record.source_ref);
        let exclude_text = if record.excludes.is_empty() {
            "(built-in only)".to_string()
        } else {
            record.excludes.join(", ")
        };
        println!("   └─ exclude {}", exclude_text);
        match matches {
            Some(true) => println!("\n✅ Tree matches the expected hash"),
            Some(false) => println!("\n❌ Tree does NOT match the expected hash"),
            None => {}
        }
    }

    Ok(matches.unwrap_or(true))
}
