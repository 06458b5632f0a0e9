//! Lazy, filtered reads over the audit log file

use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use super::{AuditEntry, EventKind};
use crate::error::{io_err, MirrorError, Result};

/// Criteria an entry must satisfy to be yielded by a query. All set
/// criteria must hold.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    kind: Option<EventKind>,
    remote: Option<String>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
}

impl AuditFilter {
    /// Matches every entry
    pub fn all() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn remote(mut self, name: impl Into<String>) -> Self {
        self.remote = Some(name.into());
        self
    }

    /// Inclusive lower bound on `recorded_at`
    pub fn since(mut self, at: DateTime<Utc>) -> Self {
        self.since = Some(at);
        self
    }

    /// Exclusive upper bound on `recorded_at`
    pub fn until(mut self, at: DateTime<Utc>) -> Self {
        self.until = Some(at);
        self
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if self.kind.is_some_and(|kind| entry.event.kind() != kind) {
            return false;
        }
        if let Some(remote) = &self.remote {
            if !entry.event.involves(remote) {
                return false;
            }
        }
        if self.since.is_some_and(|since| entry.recorded_at < since) {
            return false;
        }
        if self.until.is_some_and(|until| entry.recorded_at >= until) {
            return false;
        }
        true
    }
}

/// A query that can be iterated any number of times. Each iteration re-reads
/// the file from the start, so entries appended in between are picked up.
#[derive(Debug, Clone)]
pub struct AuditQuery {
    path: PathBuf,
    filter: AuditFilter,
}

impl AuditQuery {
    pub(super) fn new(path: &Path, filter: AuditFilter) -> Self {
        Self {
            path: path.to_path_buf(),
            filter,
        }
    }

    pub fn iter(&self) -> AuditIter {
        AuditIter::open(&self.path, self.filter.clone())
    }
}

impl<'a> IntoIterator for &'a AuditQuery {
    type Item = Result<AuditEntry>;
    type IntoIter = AuditIter;

    fn into_iter(self) -> AuditIter {
        self.iter()
    }
}

enum Source {
    Reader(BufReader<File>),
    Failed(MirrorError),
    Done,
}

/// Streams entries one line at a time.
///
/// An unparseable final line without a trailing newline is the remnant of an
/// interrupted append; it is skipped with a warning. Any other unparseable
/// line yields [`MirrorError::Corrupt`] and iteration continues after it.
pub struct AuditIter {
    path: PathBuf,
    source: Source,
    filter: AuditFilter,
    line_no: usize,
    buf: String,
}

impl AuditIter {
    fn open(path: &Path, filter: AuditFilter) -> Self {
        let source = match File::open(path) {
            Ok(file) => Source::Reader(BufReader::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Source::Done,
            Err(e) => Source::Failed(io_err(path, e)),
        };
        Self {
            path: path.to_path_buf(),
            source,
            filter,
            line_no: 0,
            buf: String::new(),
        }
    }

    /// Reads and decodes the next non-empty line, ignoring the filter.
    fn next_raw(&mut self) -> Option<Result<AuditEntry>> {
        loop {
            if matches!(self.source, Source::Failed(_)) {
                if let Source::Failed(err) = std::mem::replace(&mut self.source, Source::Done) {
                    return Some(Err(err));
                }
            }
            let Source::Reader(reader) = &mut self.source else {
                return None;
            };

            self.buf.clear();
            let read = match reader.read_line(&mut self.buf) {
                Ok(read) => read,
                Err(e) => {
                    self.source = Source::Done;
                    return Some(Err(io_err(&self.path, e)));
                }
            };
            if read == 0 {
                self.source = Source::Done;
                return None;
            }
            self.line_no += 1;

            let complete = self.buf.ends_with('\n');
            let line = self.buf.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => return Some(Ok(entry)),
                Err(e) if !complete => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = self.line_no,
                        "Skipping truncated audit entry: {}",
                        e
                    );
                    self.source = Source::Done;
                    return None;
                }
                Err(e) => {
                    return Some(Err(MirrorError::Corrupt {
                        path: self.path.clone(),
                        line: self.line_no,
                        message: e.to_string(),
                    }))
                }
            }
        }
    }

}

impl Iterator for AuditIter {
    type Item = Result<AuditEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.next_raw()? {
                Ok(entry) if !self.filter.matches(&entry) => continue,
                other => return Some(other),
            }
        }
    }
}

/// Unfiltered iteration used by chain verification and tail recovery.
pub(super) fn read_all(path: &Path) -> AuditIter {
    AuditIter::open(path, AuditFilter::all())
}
