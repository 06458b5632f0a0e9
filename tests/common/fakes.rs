//! Deterministic stand-ins for the git collaborators

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use goobits_mirror::probe::{ProbeResult, Prober};
use goobits_mirror::registry::RemoteTarget;
use goobits_mirror::sync::{Outcome, PushFailure, Pusher, SyncObserver};

/// Tracks how many calls are in flight at once
#[derive(Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Prober answering from a script; unscripted remotes are reachable
#[derive(Default)]
pub struct ScriptedProber {
    unreachable: HashMap<String, String>,
    hanging: HashSet<String>,
    slow: HashMap<String, Duration>,
    delay: Duration,
    gauge: Gauge,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable(mut self, remote: &str, reason: &str) -> Self {
        self.unreachable.insert(remote.to_string(), reason.to_string());
        self
    }

    /// The probe for `remote` never answers
    pub fn hang(mut self, remote: &str) -> Self {
        self.hanging.insert(remote.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The probe for `remote` answers only after `delay`
    pub fn slow(mut self, remote: &str, delay: Duration) -> Self {
        self.slow.insert(remote.to_string(), delay);
        self
    }

    pub fn peak_concurrency(&self) -> usize {
        self.gauge.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, target: &RemoteTarget, _timeout: Duration) -> ProbeResult {
        self.gauge.enter();
        if self.hanging.contains(&target.name) {
            std::future::pending::<()>().await;
        }
        let delay = self.slow.get(&target.name).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.gauge.exit();
        match self.unreachable.get(&target.name) {
            Some(reason) => ProbeResult::Unreachable(reason.clone()),
            None => ProbeResult::Reachable,
        }
    }
}

enum Script {
    /// Fail with these, in order, then succeed
    Failures(VecDeque<PushFailure>),
    Always(PushFailure),
    Hang,
}

/// Pusher answering from a script; unscripted remotes succeed
#[derive(Default)]
pub struct ScriptedPusher {
    scripts: Mutex<HashMap<String, Script>>,
    attempts: Mutex<HashMap<String, u32>>,
    delay: Duration,
    gauge: Gauge,
}

impl ScriptedPusher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_times(self, remote: &str, times: usize, failure: PushFailure) -> Self {
        let failures = std::iter::repeat(failure).take(times).collect();
        self.script(remote, Script::Failures(failures))
    }

    pub fn fail_always(self, remote: &str, failure: PushFailure) -> Self {
        self.script(remote, Script::Always(failure))
    }

    /// The push to `remote` never completes
    pub fn hang(self, remote: &str) -> Self {
        self.script(remote, Script::Hang)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn script(self, remote: &str, script: Script) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(remote.to_string(), script);
        self
    }

    pub fn attempts(&self, remote: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(remote)
            .copied()
            .unwrap_or(0)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.gauge.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Pusher for ScriptedPusher {
    async fn push(&self, target: &RemoteTarget, _local_root: &Path) -> Result<(), PushFailure> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(target.name.clone())
            .or_insert(0) += 1;

        let next = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&target.name) {
                None => Ok(()),
                Some(Script::Hang) => Err(None),
                Some(Script::Always(failure)) => Err(Some(failure.clone())),
                Some(Script::Failures(queue)) => match queue.pop_front() {
                    Some(failure) => Err(Some(failure)),
                    None => Ok(()),
                },
            }
        };

        self.gauge.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = match next {
            Ok(()) => Ok(()),
            Err(Some(failure)) => Err(failure),
            Err(None) => {
                std::future::pending::<()>().await;
                Ok(())
            }
        };
        self.gauge.exit();
        result
    }
}

/// One observer callback, as received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    ProbeStarted(String),
    ProbeFinished(String),
    PushAttempt(String, u32),
    Outcome(String),
}

/// Observer that remembers every callback in the order it arrived
#[derive(Default)]
pub struct RecordingObserver {
    outcomes: Mutex<Vec<(String, Outcome)>>,
    events: Mutex<Vec<ObservedEvent>>,
    probes_started: AtomicUsize,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: ObservedEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn outcomes(&self) -> Vec<(String, Outcome)> {
        self.outcomes.lock().unwrap().clone()
    }

    pub fn outcome_for(&self, remote: &str) -> Option<Outcome> {
        self.outcomes
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| name == remote)
            .map(|(_, outcome)| outcome.clone())
    }

    pub fn probes_started(&self) -> usize {
        self.probes_started.load(Ordering::SeqCst)
    }
}

impl SyncObserver for RecordingObserver {
    fn on_probe_started(&self, remote: &str) {
        self.probes_started.fetch_add(1, Ordering::SeqCst);
        self.record(ObservedEvent::ProbeStarted(remote.to_string()));
    }

    fn on_probe_finished(&self, remote: &str, _result: &ProbeResult) {
        self.record(ObservedEvent::ProbeFinished(remote.to_string()));
    }

    fn on_push_attempt(&self, remote: &str, attempt: u32) {
        self.record(ObservedEvent::PushAttempt(remote.to_string(), attempt));
    }

    fn on_outcome(&self, remote: &str, outcome: &Outcome) {
        self.record(ObservedEvent::Outcome(remote.to_string()));
        self.outcomes
            .lock()
            .unwrap()
            .push((remote.to_string(), outcome.clone()));
    }
}
