//! Concurrent probe-then-push across all remote targets
//!
//! A run has two phases. Every target is probed first; only once all probes
//! have resolved does the push phase start, and only for reachable targets.
//! Both phases fan out over a shared semaphore so at most `max_concurrency`
//! remotes are being talked to at once.
//!
//! Per-target failures never escape as errors. Each target ends with exactly
//! one [`Outcome`], written once into the outcome map by the future that owns
//! that target.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{FuturesUnordered, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::Instrument;

use super::cancel::CancelToken;
use super::retry::RetryPolicy;
use super::run::{FailReason, InFlightRun, Outcome, RemoteOutcome, SkipReason, SyncRun};
use crate::probe::{probe_with_timeout, ProbeResult, Prober};
use crate::registry::RemoteTarget;

/// A push that did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushFailure {
    pub reason: String,
    /// Whether another attempt might succeed
    pub retryable: bool,
}

impl PushFailure {
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retryable: true,
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retryable: false,
        }
    }
}

/// The version-control collaborator that performs the actual push
#[async_trait]
pub trait Pusher: Send + Sync {
    async fn push(&self, target: &RemoteTarget, local_root: &Path) -> Result<(), PushFailure>;
}

/// Receives progress notifications while a run is in flight
pub trait SyncObserver: Send + Sync {
    fn on_probe_started(&self, _remote: &str) {}
    fn on_probe_finished(&self, _remote: &str, _result: &ProbeResult) {}
    fn on_push_attempt(&self, _remote: &str, _attempt: u32) {}
    fn on_outcome(&self, _remote: &str, _outcome: &Outcome) {}
}

/// Tuning knobs for a dispatcher
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub max_concurrency: usize,
    pub probe_timeout: Duration,
    /// Bound on a single push attempt
    pub push_timeout: Duration,
    pub retry: RetryPolicy,
    /// Optional bound on the whole run
    pub run_deadline: Option<Duration>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            max_concurrency: crate::core::config::GIT_CONCURRENT_CAP,
            probe_timeout: Duration::from_secs(crate::core::config::DEFAULT_PROBE_TIMEOUT_SECS),
            push_timeout: Duration::from_secs(crate::core::config::DEFAULT_PUSH_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            run_deadline: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Probe,
    Push,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Cancelled,
    Deadline,
}

/// Orchestrates one sync run at a time; runs share nothing with each other.
pub struct SyncDispatcher {
    prober: Arc<dyn Prober>,
    pusher: Arc<dyn Pusher>,
    options: DispatchOptions,
    observer: Option<Arc<dyn SyncObserver>>,
}

impl SyncDispatcher {
    pub fn new(prober: Arc<dyn Prober>, pusher: Arc<dyn Pusher>, options: DispatchOptions) -> Self {
        Self {
            prober,
            pusher,
            options,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Probes and pushes `local_root` to every target, returning the sealed run.
    ///
    /// The returned run always names every target, in the order given.
    pub async fn run(
        &self,
        targets: &[RemoteTarget],
        local_root: &Path,
        cancel: &CancelToken,
    ) -> SyncRun {
        let in_flight = InFlightRun::start(local_root);
        let span = tracing::info_span!("sync_run", run_id = %in_flight.run_id());
        self.drive(in_flight, targets, local_root, cancel)
            .instrument(span)
            .await
    }

    async fn drive(
        &self,
        in_flight: InFlightRun,
        targets: &[RemoteTarget],
        local_root: &Path,
        cancel: &CancelToken,
    ) -> SyncRun {
        let outcomes: DashMap<usize, RemoteOutcome> = DashMap::with_capacity(targets.len());
        let probes: DashMap<usize, ProbeResult> = DashMap::with_capacity(targets.len());
        let workers = self.options.max_concurrency.clamp(1, targets.len().max(1));
        let semaphore = Arc::new(Semaphore::new(workers));
        let deadline = self.options.run_deadline.map(|d| tokio::time::Instant::now() + d);
        tracing::info!(targets = targets.len(), workers, "starting sync run");

        let probe_phase = self.probe_all(targets, &semaphore, &outcomes, &probes);
        let interrupted = match interruptible(probe_phase, cancel, deadline).await {
            Ok(reachable) => {
                let push_phase =
                    self.push_all(targets, &reachable, local_root, &semaphore, &outcomes);
                interruptible(push_phase, cancel, deadline)
                    .await
                    .err()
                    .map(|interrupt| (interrupt, Phase::Push))
            }
            Err(interrupt) => Some((interrupt, Phase::Probe)),
        };

        if let Some((interrupt, phase)) = interrupted {
            tracing::warn!(?interrupt, ?phase, "sync run interrupted");
        }

        let finished: Vec<RemoteOutcome> = targets
            .iter()
            .enumerate()
            .map(|(index, target)| {
                let mut record = outcomes
                    .remove(&index)
                    .map(|(_, record)| record)
                    .unwrap_or_else(|| {
                        let outcome = unfinished_outcome(interrupted);
                        self.notify(|o| o.on_outcome(&target.name, &outcome));
                        RemoteOutcome::new(target, outcome)
                    });
                if record.probe.is_none() {
                    record.probe = probes.get(&index).map(|p| p.value().clone());
                }
                record
            })
            .collect();

        let cancelled = matches!(interrupted, Some((Interrupt::Cancelled, _)));
        let run = in_flight.finish(finished, cancelled);
        tracing::info!(
            status = run.overall_status().text(),
            succeeded = run.count(Outcome::is_success),
            skipped = run.count(Outcome::is_skipped),
            "sync run finished"
        );
        run
    }

    /// Probes every target; returns indices of reachable ones.
    async fn probe_all(
        &self,
        targets: &[RemoteTarget],
        semaphore: &Arc<Semaphore>,
        outcomes: &DashMap<usize, RemoteOutcome>,
        probes: &DashMap<usize, ProbeResult>,
    ) -> Vec<usize> {
        let mut pending: FuturesUnordered<_> = targets
            .iter()
            .enumerate()
            .map(|(index, target)| async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return (index, ProbeResult::Unreachable("worker pool closed".to_string()));
                };
                self.notify(|o| o.on_probe_started(&target.name));
                let result =
                    probe_with_timeout(self.prober.as_ref(), target, self.options.probe_timeout)
                        .await;
                tracing::debug!(remote = %target.name, ?result, "probe finished");
                self.notify(|o| o.on_probe_finished(&target.name, &result));
                (index, result)
            })
            .collect();

        let mut reachable = Vec::with_capacity(targets.len());
        while let Some((index, result)) = pending.next().await {
            probes.insert(index, result.clone());
            let target = &targets[index];
            let skip = match result {
                ProbeResult::Reachable => {
                    reachable.push(index);
                    continue;
                }
                ProbeResult::Unreachable(reason) => SkipReason::Unreachable(reason),
                ProbeResult::Timeout => SkipReason::Timeout,
            };
            let outcome = Outcome::Skipped(skip);
            self.notify(|o| o.on_outcome(&target.name, &outcome));
            outcomes.insert(index, RemoteOutcome::new(target, outcome));
        }
        reachable.sort_unstable();
        reachable
    }

    async fn push_all(
        &self,
        targets: &[RemoteTarget],
        reachable: &[usize],
        local_root: &Path,
        semaphore: &Arc<Semaphore>,
        outcomes: &DashMap<usize, RemoteOutcome>,
    ) {
        let mut pending: FuturesUnordered<_> = reachable
            .iter()
            .map(|&index| {
                let target = &targets[index];
                async move {
                    let started = Instant::now();
                    let Ok(_permit) = semaphore.acquire().await else {
                        let outcome =
                            Outcome::Failed(FailReason::Transport(
                                "worker pool closed".to_string(),
                            ));
                        return (index, outcome, 0, started.elapsed());
                    };
                    let (outcome, attempts) = self.push_with_retry(target, local_root).await;
                    (index, outcome, attempts, started.elapsed())
                }
            })
            .collect();

        while let Some((index, outcome, attempts, elapsed)) = pending.next().await {
            let target = &targets[index];
            self.notify(|o| o.on_outcome(&target.name, &outcome));
            let mut record = RemoteOutcome::new(target, outcome);
            record.probe = Some(ProbeResult::Reachable);
            record.attempts = attempts;
            record.elapsed_ms = elapsed.as_millis() as u64;
            outcomes.insert(index, record);
        }
    }

    /// Pushes one target, retrying retryable failures with backoff.
    async fn push_with_retry(&self, target: &RemoteTarget, root: &Path) -> (Outcome, u32) {
        let policy = &self.options.retry;
        let max_attempts = policy.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.notify(|o| o.on_push_attempt(&target.name, attempt));
            tracing::debug!(remote = %target.name, attempt, "pushing");

            let pushed = tokio::time::timeout(
                self.options.push_timeout,
                self.pusher.push(target, root),
            )
            .await;
            let (reason, retryable) = match pushed {
                Ok(Ok(())) => return (Outcome::Succeeded, attempt),
                Ok(Err(failure)) => (FailReason::Transport(failure.reason), failure.retryable),
                Err(_) => (FailReason::Timeout, true),
            };

            if !retryable || attempt >= max_attempts {
                tracing::warn!(remote = %target.name, attempt, %reason, "push failed");
                return (Outcome::Failed(reason), attempt);
            }

            let delay = policy.delay_after(attempt);
            tracing::warn!(
                remote = %target.name,
                attempt,
                %reason,
                delay_ms = delay.as_millis() as u64,
                "push failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn notify(&self, f: impl FnOnce(&dyn SyncObserver)) {
        if let Some(observer) = self.observer.as_deref() {
            f(observer);
        }
    }
}

/// Outcome for a target that had no terminal result when the run stopped
fn unfinished_outcome(interrupted: Option<(Interrupt, Phase)>) -> Outcome {
    match interrupted {
        Some((Interrupt::Cancelled, _)) => Outcome::Skipped(SkipReason::Cancelled),
        Some((Interrupt::Deadline, Phase::Probe)) => Outcome::Skipped(SkipReason::Timeout),
        Some((Interrupt::Deadline, Phase::Push)) => Outcome::Failed(FailReason::Timeout),
        None => Outcome::Failed(FailReason::Transport(
            "worker finished without an outcome".to_string(),
        )),
    }
}

/// Drives `work` until it finishes, the token fires, or the deadline passes.
async fn interruptible<F: std::future::Future>(
    work: F,
    cancel: &CancelToken,
    deadline: Option<tokio::time::Instant>,
) -> Result<F::Output, Interrupt> {
    let deadline_reached = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupt::Cancelled),
        _ = deadline_reached => Err(Interrupt::Deadline),
        output = work => Ok(output),
    }
}
