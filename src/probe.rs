//! Connectivity probing
//!
//! A probe is a read-only handshake with a remote (for git, a reference
//! listing). It never pushes data. The dispatcher treats anything other than
//! [`ProbeResult::Reachable`] as a reason to skip the remote for this run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::registry::RemoteTarget;

/// Result of a single probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "reason", rename_all = "snake_case")]
pub enum ProbeResult {
    Reachable,
    Unreachable(String),
    Timeout,
}

impl ProbeResult {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeResult::Reachable)
    }
}

/// Checks whether a remote can be reached and authenticated against.
///
/// Implementations must return within roughly `timeout`; the dispatcher also
/// enforces the bound, so a hung implementation is reported as
/// [`ProbeResult::Timeout`].
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: &RemoteTarget, timeout: Duration) -> ProbeResult;
}

/// Runs `prober` with a hard upper bound of `timeout`.
pub async fn probe_with_timeout(
    prober: &dyn Prober,
    target: &RemoteTarget,
    timeout: Duration,
) -> ProbeResult {
    match tokio::time::timeout(timeout, prober.probe(target, timeout)).await {
        Ok(result) => result,
        Err(_) => ProbeResult::Timeout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowProber;

    #[async_trait]
    impl Prober for SlowProber {
        async fn probe(&self, _target: &RemoteTarget, _timeout: Duration) -> ProbeResult {
            tokio::time::sleep(Duration::from_secs(60)).await;
            ProbeResult::Reachable
        }
    }

    #[tokio::test]
    async fn test_hung_prober_reports_timeout() {
        let target = RemoteTarget::new("slow", "https://example.com/slow.git").unwrap();
        let result = probe_with_timeout(&SlowProber, &target, Duration::from_millis(20)).await;
        assert_eq!(result, ProbeResult::Timeout);
    }

    #[test]
    fn test_probe_result_serialization() {
        let json = serde_json::to_string(&ProbeResult::Unreachable("dns".to_string())).unwrap();
        assert_eq!(json, r#"{"result":"unreachable","reason":"dns"}"#);
    }
}
