//! Syntactic validation for remote names and transport endpoints
//!
//! Nothing here touches the network: reachability is the prober's job.

use crate::error::{MirrorError, Result};

/// Schemes git understands natively
const KNOWN_SCHEMES: &[&str] = &["https", "http", "ssh", "git", "file"];

const MAX_NAME_LENGTH: usize = 64;

/// The transport family an endpoint uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// `scheme://host/path`
    Url,
    /// `user@host:path`
    ScpLike,
    /// Absolute filesystem path
    Local,
}

/// Validates a remote name: non-empty, no whitespace, `[A-Za-z0-9._-]` only.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| MirrorError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name cannot be empty"));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(invalid("name is too long"));
    }
    if name.starts_with('-') || name.starts_with('.') {
        return Err(invalid("name cannot start with '-' or '.'"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(invalid(&format!("character '{c}' is not allowed")));
    }
    Ok(())
}

/// Validates an endpoint and reports which transport it uses.
///
/// Accepted forms:
/// - `https://host/path`, `ssh://user@host:22/path`, `git://host/path`
/// - `file:///absolute/path`
/// - `user@host:path` (scp-like ssh)
/// - `/absolute/path` (local transport)
pub fn validate_endpoint(endpoint: &str) -> Result<Transport> {
    let invalid = |reason: &str| MirrorError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };

    if endpoint.trim().is_empty() {
        return Err(invalid("endpoint cannot be empty"));
    }
    if endpoint.chars().any(char::is_whitespace) {
        return Err(invalid("endpoint cannot contain whitespace"));
    }
    // git would read these as options
    if endpoint.starts_with('-') {
        return Err(invalid("endpoint cannot start with '-'"));
    }

    if let Some((scheme, rest)) = endpoint.split_once("://") {
        let scheme = scheme.to_ascii_lowercase();
        if !KNOWN_SCHEMES.contains(&scheme.as_str()) {
            return Err(invalid(&format!("unsupported scheme '{scheme}'")));
        }
        if scheme == "file" {
            if rest.len() < 2 || !rest.starts_with('/') {
                return Err(invalid("file endpoints need an absolute path"));
            }
            return Ok(Transport::Url);
        }

        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, path),
            None => (rest, ""),
        };
        let host = authority
            .rsplit_once('@')
            .map_or(authority, |(_, host)| host);
        let host = host.split(':').next().unwrap_or("");
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        if host.starts_with('-') {
            return Err(invalid("host cannot start with '-'"));
        }
        if path.trim_matches('/').is_empty() {
            return Err(invalid("missing repository path"));
        }
        return Ok(Transport::Url);
    }

    if endpoint.starts_with('/') {
        return Ok(Transport::Local);
    }

    // scp-like syntax: the colon must come before any slash
    if let Some((authority, path)) = endpoint.split_once(':') {
        if authority.contains('/') {
            return Err(invalid("relative paths are not valid endpoints"));
        }
        let host = authority
            .rsplit_once('@')
            .map_or(authority, |(_, host)| host);
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        if host.starts_with('-') {
            return Err(invalid("host cannot start with '-'"));
        }
        if path.is_empty() {
            return Err(invalid("missing repository path"));
        }
        return Ok(Transport::ScpLike);
    }

    Err(invalid("expected scheme://host/path, user@host:path or an absolute path"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["origin", "backup-1", "gitlab_mirror", "eu.west"] {
            assert!(validate_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", "-origin", ".hidden", "has space", "bad/slash", "ü"] {
            assert!(
                matches!(validate_name(name), Err(MirrorError::InvalidName { .. })),
                "{name:?} should be rejected"
            );
        }
        assert!(validate_name(&"a".repeat(MAX_NAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_url_endpoints() {
        assert_eq!(
            validate_endpoint("https://github.com/goobits/mirror.git").unwrap(),
            Transport::Url
        );
        assert_eq!(
            validate_endpoint("ssh://git@example.com:2222/team/repo.git").unwrap(),
            Transport::Url
        );
        assert_eq!(
            validate_endpoint("file:///srv/git/repo.git").unwrap(),
            Transport::Url
        );
    }

    #[test]
    fn test_scp_and_local_endpoints() {
        assert_eq!(
            validate_endpoint("git@github.com:goobits/mirror.git").unwrap(),
            Transport::ScpLike
        );
        assert_eq!(
            validate_endpoint("/srv/git/repo.git").unwrap(),
            Transport::Local
        );
    }

    #[test]
    fn test_invalid_endpoints() {
        for endpoint in [
            "",
            "   ",
            "ftp://example.com/repo",
            "https://",
            "https://github.com",
            "https:///repo.git",
            "file://relative",
            "relative/path",
            "git@github.com:",
            ":path",
            "https://github.com/has space.git",
            "--upload-pack=touch${IFS}pwned:x",
            "-oProxyCommand=evil:x",
            "git@-oProxyCommand=evil:repo.git",
            "ssh://-oProxyCommand=evil/repo.git",
        ] {
            assert!(
                matches!(
                    validate_endpoint(endpoint),
                    Err(MirrorError::InvalidEndpoint { .. })
                ),
                "{endpoint:?} should be rejected"
            );
        }
    }
}
