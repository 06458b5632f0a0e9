use chrono::Utc;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::chain::{compute_entry_hash, ChainError, ChainReport, ChainVerifier};
use super::query::{read_all, AuditFilter, AuditQuery};
use super::{AuditEntry, AuditEvent};
use crate::error::{persistence_err, MirrorError, Result};

#[derive(Debug, Default)]
struct ChainState {
    next_seq: u64,
    last_hash: Option<String>,
    /// File length after our last write; a mismatch means another writer appended.
    known_len: u64,
}

/// Handle to an append-only JSON Lines audit log.
///
/// Appends are serialized in-process by a mutex and across processes by an
/// exclusive file lock, and are synced to disk before returning. Existing
/// lines are never rewritten.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    state: Mutex<ChainState>,
}

impl AuditLog {
    /// Opens (or prepares to create) the log at `path`, recovering the chain
    /// tail from any existing entries.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| persistence_err(parent, e))?;
            }
        }
        let state = scan_tail(&path)?;
        tracing::debug!(
            path = %path.display(),
            next_seq = state.next_seq,
            "Opened audit log"
        );
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably appends one event. On error nothing has been recorded and the
    /// caller must treat the event as lost.
    pub fn append(&self, event: AuditEvent) -> Result<AuditEntry> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| persistence_err(&self.path, e))?;
        file.lock_exclusive()
            .map_err(|e| persistence_err(&self.path, e))?;

        let result = self.append_locked(&mut file, &mut state, event);
        // Dropping the handle releases the lock even if unlock fails.
        let _ = file.unlock();

        match &result {
            Ok(entry) => tracing::debug!(
                seq = entry.seq,
                kind = %entry.event.kind(),
                "Appended audit entry"
            ),
            Err(e) => tracing::error!("Failed to append audit entry: {}", e),
        }
        result
    }

    fn append_locked(
        &self,
        file: &mut File,
        state: &mut ChainState,
        event: AuditEvent,
    ) -> Result<AuditEntry> {
        let persist = |e: io::Error| persistence_err(&self.path, e);

        let len = file.metadata().map_err(persist)?.len();
        if len != state.known_len {
            *state = scan_tail(&self.path)?;
        }
        let torn_tail = len > 0 && !ends_with_newline(file).map_err(persist)?;

        let seq = state.next_seq;
        let recorded_at = Utc::now();
        let prev_hash = state.last_hash.clone();
        let entry_hash = compute_entry_hash(seq, &recorded_at, &event, prev_hash.as_deref());
        let entry = AuditEntry {
            seq,
            recorded_at,
            prev_hash,
            entry_hash,
            event,
        };

        let mut line = Vec::with_capacity(512);
        if torn_tail {
            line.push(b'\n');
        }
        serde_json::to_writer(&mut line, &entry).map_err(|e| persist(io::Error::other(e)))?;
        line.push(b'\n');

        file.write_all(&line).map_err(persist)?;
        file.flush().map_err(persist)?;
        file.sync_data().map_err(persist)?;

        state.next_seq = seq + 1;
        state.last_hash = Some(entry.entry_hash.clone());
        state.known_len = len + line.len() as u64;
        Ok(entry)
    }

    /// Entries matching `filter`, in the order they were recorded
    pub fn query(&self, filter: AuditFilter) -> AuditQuery {
        AuditQuery::new(&self.path, filter)
    }

    pub fn entries(&self) -> AuditQuery {
        self.query(AuditFilter::all())
    }

    /// Walks the whole log checking sequence numbers, links and hashes.
    /// Stops at the first violation.
    pub fn verify_chain(&self) -> Result<ChainReport> {
        let mut verifier = ChainVerifier::new();
        let mut first_error = None;

        for item in read_all(&self.path) {
            match item {
                Ok(entry) => {
                    if let Err(e) = verifier.check(&entry) {
                        first_error = Some(e);
                        break;
                    }
                }
                Err(MirrorError::Corrupt { line, message, .. }) => {
                    first_error = Some(ChainError::Unreadable { line, message });
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(ChainReport {
            entries: verifier.checked(),
            first_error,
        })
    }
}

/// Finds the last readable entry so new appends chain onto it.
fn scan_tail(path: &Path) -> Result<ChainState> {
    let mut last: Option<AuditEntry> = None;
    for item in read_all(path) {
        match item {
            Ok(entry) => last = Some(entry),
            Err(MirrorError::Corrupt { line, message, .. }) => {
                tracing::warn!(path = %path.display(), line, "Unreadable audit entry: {}", message);
            }
            Err(e) => return Err(e),
        }
    }

    let known_len = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
        Err(e) => return Err(persistence_err(path, e)),
    };

    Ok(match last {
        Some(entry) => ChainState {
            next_seq: entry.seq + 1,
            last_hash: Some(entry.entry_hash),
            known_len,
        },
        None => ChainState {
            next_seq: 1,
            last_hash: None,
            known_len,
        },
    })
}

fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{EventKind, RemoteChange};
    use crate::registry::RemoteTarget;
    use std::sync::Arc;

    fn removed(name: &str) -> AuditEvent {
        AuditEvent::Remote(RemoteChange::Removed {
            name: name.to_string(),
        })
    }

    #[test]
    fn test_append_assigns_sequence_and_chain() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("audit.jsonl")).unwrap();

        let first = log.append(removed("a")).unwrap();
        let second = log.append(removed("b")).unwrap();

        assert_eq!(first.seq, 1);
        assert!(first.prev_hash.is_none());
        assert_eq!(second.seq, 2);
        assert_eq!(second.prev_hash.as_deref(), Some(first.entry_hash.as_str()));

        let entries: Vec<_> = log.entries().iter().map(|e| e.unwrap()).collect();
        assert_eq!(entries, vec![first, second]);
    }

    #[test]
    fn test_reopen_continues_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let last = {
            let log = AuditLog::open(&path).unwrap();
            log.append(removed("a")).unwrap();
            log.append(removed("b")).unwrap()
        };

        let log = AuditLog::open(&path).unwrap();
        let next = log.append(removed("c")).unwrap();
        assert_eq!(next.seq, 3);
        assert_eq!(next.prev_hash, Some(last.entry_hash));
        assert!(log.verify_chain().unwrap().is_intact());
    }

    #[test]
    fn test_two_handles_share_one_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let left = AuditLog::open(&path).unwrap();
        let right = AuditLog::open(&path).unwrap();

        left.append(removed("a")).unwrap();
        right.append(removed("b")).unwrap();
        left.append(removed("c")).unwrap();

        let report = left.verify_chain().unwrap();
        assert_eq!(report.entries, 3);
        assert!(report.is_intact());
    }

    #[test]
    fn test_concurrent_appends_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(AuditLog::open(dir.path().join("audit.jsonl")).unwrap());

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let log = Arc::clone(&log);
                scope.spawn(move || {
                    for i in 0..25 {
                        log.append(removed(&format!("w{worker}-{i}"))).unwrap();
                    }
                });
            }
        });

        let entries: Vec<_> = log.entries().iter().map(|e| e.unwrap()).collect();
        assert_eq!(entries.len(), 200);
        let seqs: Vec<u64> = entries.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, (1..=200).collect::<Vec<_>>());
        assert!(log.verify_chain().unwrap().is_intact());
    }

    #[test]
    fn test_tampering_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open(&path).unwrap();
        log.append(removed("alpha")).unwrap();
        log.append(removed("beta")).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        fs::write(&path, contents.replace("alpha", "gamma")).unwrap();

        let report = log.verify_chain().unwrap();
        assert!(!report.is_intact());
        assert_eq!(report.first_error, Some(ChainError::HashMismatch { seq: 1 }));
    }

    #[test]
    fn test_deleted_entry_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open(&path).unwrap();
        for name in ["a", "b", "c"] {
            log.append(removed(name)).unwrap();
        }

        let contents = fs::read_to_string(&path).unwrap();
        let kept: Vec<&str> = contents
            .lines()
            .enumerate()
            .filter(|(i, _)| *i != 1)
            .map(|(_, l)| l)
            .collect();
        fs::write(&path, kept.join("\n") + "\n").unwrap();

        let report = log.verify_chain().unwrap();
        assert_eq!(
            report.first_error,
            Some(ChainError::SequenceGap {
                expected: 2,
                found: 3
            })
        );
    }

    #[test]
    fn test_torn_tail_is_skipped_and_appends_continue() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let log = AuditLog::open(&path).unwrap();
            log.append(removed("a")).unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"seq":2,"recorded_at":"#).unwrap();
        drop(file);

        let log = AuditLog::open(&path).unwrap();
        assert_eq!(log.entries().iter().count(), 1);

        let next = log.append(removed("b")).unwrap();
        assert_eq!(next.seq, 2);

        // The torn fragment is now a complete but unreadable line.
        let items: Vec<_> = log.entries().iter().collect();
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(MirrorError::Corrupt { line: 2, .. })));
        assert_eq!(items[2].as_ref().unwrap().seq, 2);
    }

    #[test]
    fn test_query_is_restartable_and_sees_new_entries() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("audit.jsonl")).unwrap();
        let target = RemoteTarget::new("origin", "https://example.com/a.git").unwrap();
        log.append(AuditEvent::Remote(RemoteChange::Added { target }))
            .unwrap();
        log.append(removed("other")).unwrap();

        let query = log.query(AuditFilter::all().remote("origin"));
        assert_eq!(query.iter().count(), 1);

        log.append(removed("origin")).unwrap();
        assert_eq!(query.iter().count(), 2);
        assert_eq!(
            log.query(AuditFilter::all().kind(EventKind::Sync))
                .iter()
                .count(),
            0
        );
    }

    #[test]
    fn test_open_fails_when_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();

        let err = AuditLog::open(blocker.join("audit.jsonl")).unwrap_err();
        assert!(matches!(err, MirrorError::Persistence { .. }));
    }
}
