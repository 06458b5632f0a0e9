//! mirror: push one working tree to many git remotes at once
//! and keep a verifiable record of what was pushed where.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use goobits_mirror::audit::EventKind;
use goobits_mirror::commands::audit::{
    handle_audit_log, handle_rebuild_registry, handle_verify_audit, AuditLogArgs,
};
use goobits_mirror::commands::integrity::{handle_verify_integrity, VerifyArgs};
use goobits_mirror::commands::remote::{
    handle_add_remote, handle_list_remotes, handle_remove_remote,
};
use goobits_mirror::commands::sync::{handle_sync_all, SyncArgs};
use goobits_mirror::commands::MirrorContext;
use goobits_mirror::core::init_logging;
use goobits_mirror::error::{ErrorKind, MirrorError};
use goobits_mirror::sync::cancel_pair;

const EXIT_SUCCESS: u8 = 0;
const EXIT_FAILURE: u8 = 1;
const EXIT_USAGE: u8 = 3;
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(
    name = "mirror",
    version,
    about = "Push one working tree to many git remotes and prove what was pushed"
)]
struct Cli {
    /// Local tree to mirror
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Directory holding the registry, audit log and config [env: MIRROR_HOME]
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// More diagnostics on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a remote
    AddRemote {
        name: String,
        endpoint: String,
        /// Overwrite the endpoint of an existing remote with the same name
        #[arg(long)]
        replace: bool,
    },
    /// Unregister a remote
    RemoveRemote { name: String },
    /// Show registered remotes
    ListRemotes {
        #[arg(long)]
        json: bool,
    },
    /// Probe every remote, then push to all reachable ones
    SyncAll {
        /// Per-attempt push timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
        /// Maximum remotes talked to at once [env: MIRROR_CONCURRENCY]
        #[arg(long, value_name = "N")]
        max_concurrency: Option<usize>,
        /// Skip hashing the tree after the run
        #[arg(long)]
        no_verify: bool,
        #[arg(long)]
        json: bool,
        #[arg(long, short)]
        quiet: bool,
    },
    /// Compute the tree hash of the local tree
    VerifyIntegrity {
        /// Additional gitignore-style pattern to leave out (repeatable)
        #[arg(long = "exclude", value_name = "GLOB")]
        excludes: Vec<String>,
        /// Fail unless the tree hash equals this digest
        #[arg(long, value_name = "SHA256", value_parser = parse_digest)]
        expect: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show recorded events
    AuditLog {
        #[arg(long)]
        kind: Option<EventKind>,
        #[arg(long)]
        remote: Option<String>,
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Check the audit log's hash chain
    VerifyAudit,
    /// Recreate the registry file from the audit log
    RebuildRegistry,
}

fn parse_digest(value: &str) -> Result<String, String> {
    let value = value.trim();
    if value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(value.to_ascii_lowercase())
    } else {
        Err("expected a 64-character hex SHA-256 digest".to_string())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version output are not errors
            let code = if e.use_stderr() { EXIT_USAGE } else { EXIT_SUCCESS };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("❌ {e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let root = std::fs::canonicalize(&cli.root).unwrap_or(cli.root);
    let ctx = MirrorContext::load(root, cli.state_dir)?;

    match cli.command {
        Commands::AddRemote {
            name,
            endpoint,
            replace,
        } => handle_add_remote(&ctx, &name, &endpoint, replace)?,
        Commands::RemoveRemote { name } => handle_remove_remote(&ctx, &name)?,
        Commands::ListRemotes { json } => handle_list_remotes(&ctx, json)?,
        Commands::SyncAll {
            timeout,
            max_concurrency,
            no_verify,
            json,
            quiet,
        } => {
            let (handle, token) = cancel_pair();
            tokio::spawn(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    if handle.is_cancelled() {
                        eprintln!("\n🛑 Interrupted again; exiting without recording the run");
                        std::process::exit(EXIT_INTERRUPTED);
                    }
                    eprintln!("\n🛑 Cancelling; press Ctrl-C again to quit immediately");
                    handle.cancel();
                }
            });

            let args = SyncArgs {
                timeout_secs: timeout,
                max_concurrency,
                no_verify,
                json,
                quiet,
            };
            let status = handle_sync_all(&ctx, args, token).await?;
            // Exit codes are 0..=130, all of which fit in a u8
            return Ok(u8::try_from(status.exit_code()).unwrap_or(EXIT_FAILURE));
        }
        Commands::VerifyIntegrity {
            excludes,
            expect,
            json,
        } => {
            let args = VerifyArgs {
                excludes,
                expect,
                json,
            };
            if !handle_verify_integrity(&ctx, args).await? {
                return Ok(EXIT_FAILURE);
            }
        }
        Commands::AuditLog {
            kind,
            remote,
            limit,
            json,
        } => handle_audit_log(
            &ctx,
            AuditLogArgs {
                kind,
                remote,
                limit,
                json,
            },
        )?,
        Commands::VerifyAudit => {
            if !handle_verify_audit(&ctx)? {
                return Ok(EXIT_FAILURE);
            }
        }
        Commands::RebuildRegistry => handle_rebuild_registry(&ctx)?,
    }

    Ok(EXIT_SUCCESS)
}

/// Validation problems exit 3; storage and anything else exit 1.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    let kind = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<MirrorError>())
        .map(MirrorError::kind);
    match kind {
        Some(ErrorKind::Validation) => EXIT_USAGE,
        _ => EXIT_FAILURE,
    }
}
