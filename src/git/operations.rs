//! Git command execution and output classification

use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

// Git command arguments. Each list ends in `--` so the endpoint that follows
// is never parsed as an option.
const GIT_LS_REMOTE_ARGS: &[&str] = &["ls-remote", "--heads", "--quiet", "--"];
const GIT_PUSH_ARGS: &[&str] = &["push", "--porcelain", "--"];
const GIT_PUSH_TAGS_ARGS: &[&str] = &["push", "--porcelain", "--tags", "--"];
const GIT_REV_PARSE_HEAD_ARGS: &[&str] = &["rev-parse", "--verify", "--quiet", "HEAD"];
const GIT_REV_PARSE_TIMEOUT_SECS: u64 = 10;

// Display formatting
const ERROR_MESSAGE_MAX_LENGTH: usize = 80;
const ERROR_MESSAGE_TRUNCATE_LENGTH: usize = 77;

/// Runs a git command in the specified directory with a timeout
/// Returns (success, stdout, stderr)
///
/// The child is killed if the timeout fires or the returned future is dropped,
/// and git is never allowed to prompt for credentials.
pub async fn run_git(
    path: &Path,
    args: &[&str],
    timeout: Duration,
) -> Result<(bool, String, String)> {
    let mut command = Command::new("git");
    command
        .args(args)
        .current_dir(path)
        .env("GIT_TERMINAL_PROMPT", "0")
        .kill_on_drop(true);
    if std::env::var_os("GIT_SSH_COMMAND").is_none() {
        command.env("GIT_SSH_COMMAND", "ssh -o BatchMode=yes");
    }

    let result = tokio::time::timeout(timeout, command.output()).await;

    match result {
        Ok(Ok(output)) => Ok((
            output.status.success(),
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        )),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(anyhow::anyhow!(
            "Git operation timed out after {} seconds",
            timeout.as_secs()
        )),
    }
}

/// Lists the heads of `endpoint`; success means the remote answered.
pub async fn ls_remote(
    work_dir: &Path,
    endpoint: &str,
    timeout: Duration,
) -> Result<(bool, String, String)> {
    run_git(work_dir, &with_operands(GIT_LS_REMOTE_ARGS, &[endpoint]), timeout).await
}

/// Pushes `refspec` from the repository at `path` to `endpoint`
pub async fn push(
    path: &Path,
    endpoint: &str,
    refspec: &str,
    timeout: Duration,
) -> Result<(bool, String, String)> {
    run_git(path, &with_operands(GIT_PUSH_ARGS, &[endpoint, refspec]), timeout).await
}

pub async fn push_tags(
    path: &Path,
    endpoint: &str,
    timeout: Duration,
) -> Result<(bool, String, String)> {
    run_git(path, &with_operands(GIT_PUSH_TAGS_ARGS, &[endpoint]), timeout).await
}

fn with_operands<'a>(options: &[&'a str], operands: &[&'a str]) -> Vec<&'a str> {
    options.iter().chain(operands).copied().collect()
}

/// Commit id of HEAD, or `None` when `path` is not a git work tree, has no
/// commits yet, or git is unavailable.
pub async fn current_ref(path: &Path) -> Option<String> {
    match run_git(
        path,
        GIT_REV_PARSE_HEAD_ARGS,
        Duration::from_secs(GIT_REV_PARSE_TIMEOUT_SECS),
    )
    .await
    {
        Ok((true, sha, _)) if !sha.is_empty() => Some(sha),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(path = %path.display(), "Could not resolve HEAD: {}", e);
            None
        }
    }
}

/// Detects if an error message indicates a rate limit issue
pub fn is_rate_limit_error(error_msg: &str) -> bool {
    let error_lower = error_msg.to_lowercase();
    error_lower.contains("rate limit")
        || error_lower.contains("too many requests")
        || error_lower.contains("secondary rate limit")
        || (error_lower.contains("403") && error_lower.contains("github"))
}

/// True for failures that may clear up on their own: throttling, timeouts,
/// dropped connections and server-side errors.
pub fn is_transient_error(error_msg: &str) -> bool {
    if is_rate_limit_error(error_msg) {
        return true;
    }
    let error_lower = error_msg.to_lowercase();
    [
        "timed out",
        "connection reset",
        "connection refused",
        "connection closed",
        "remote end hung up",
        "early eof",
        "temporarily unavailable",
        "operation too slow",
        "the requested url returned error: 5",
        "502 bad gateway",
        "503 service unavailable",
    ]
    .iter()
    .any(|pattern| error_lower.contains(pattern))
}

/// Collapses git's multi-line stderr into a short, stable reason
pub fn clean_error_message(error: &str) -> String {
    // Replace newlines/tabs with spaces and collapse whitespace
    let cleaned = error
        .replace('\n', " ")
        .replace('\r', "")
        .replace('\t', " ");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let lower = cleaned.to_lowercase();

    if is_rate_limit_error(&cleaned) {
        "rate limited".to_string()
    } else if lower.contains("timed out") {
        "timeout".to_string()
    } else if lower.contains("non-fast-forward") || lower.contains("fetch first") {
        "rejected (non-fast-forward)".to_string()
    } else if lower.contains("[rejected]") || lower.contains("[remote rejected]") {
        "rejected by remote".to_string()
    } else if lower.contains("authentication") || lower.contains("permission denied") {
        "authentication failed".to_string()
    } else if lower.contains("could not resolve host") {
        "host not found".to_string()
    } else if lower.contains("does not appear to be a git repository")
        || lower.contains("repository not found")
        || lower.contains("not found")
    {
        "repository not found".to_string()
    } else if lower.contains("connection") || lower.contains("network") {
        "network error".to_string()
    } else if cleaned.is_empty() {
        "git exited with an error".to_string()
    } else if cleaned.chars().count() > ERROR_MESSAGE_MAX_LENGTH {
        // Truncate long messages
        let head: String = cleaned.chars().take(ERROR_MESSAGE_TRUNCATE_LENGTH).collect();
        format!("{}...", head)
    } else {
        cleaned
    }
}
