//! Hash chaining for audit entries

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::{AuditEntry, AuditEvent};

const CHAIN_DOMAIN: &[u8] = b"mirror-audit-v1:";

#[derive(Serialize)]
struct HashedPayload<'a> {
    seq: u64,
    recorded_at: &'a DateTime<Utc>,
    event: &'a AuditEvent,
}

/// Hash covering an entry's sequence number, timestamp, event and predecessor.
pub fn compute_entry_hash(
    seq: u64,
    recorded_at: &DateTime<Utc>,
    event: &AuditEvent,
    prev_hash: Option<&str>,
) -> String {
    let payload = serde_json::to_vec(&HashedPayload {
        seq,
        recorded_at,
        event,
    })
    // Serializing plain data structs into memory cannot fail.
    .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(CHAIN_DOMAIN);
    hasher.update(prev_hash.unwrap_or("").as_bytes());
    hasher.update(b":");
    hasher.update(&payload);
    format!("{:x}", hasher.finalize())
}

/// First integrity violation found in a chain
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("first entry (seq {seq}) has a previous hash")]
    GenesisHasPrevHash { seq: u64 },

    #[error("entry seq {seq} does not link to its predecessor")]
    BrokenLink { seq: u64 },

    #[error("entry seq {seq} hash does not match its contents")]
    HashMismatch { seq: u64 },

    #[error("sequence gap: expected seq {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },

    #[error("unreadable entry at line {line}: {message}")]
    Unreadable { line: usize, message: String },
}

/// Summary of a chain verification pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReport {
    pub entries: usize,
    pub first_error: Option<ChainError>,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.first_error.is_none()
    }
}

/// Incremental verifier, fed entries in file order.
#[derive(Debug, Default)]
pub struct ChainVerifier {
    previous: Option<(u64, String)>,
    checked: usize,
}

impl ChainVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, entry: &AuditEntry) -> Result<(), ChainError> {
        match &self.previous {
            None => {
                if entry.prev_hash.is_some() {
                    return Err(ChainError::GenesisHasPrevHash { seq: entry.seq });
                }
            }
            Some((prev_seq, prev_hash)) => {
                if entry.seq != prev_seq + 1 {
                    return Err(ChainError::SequenceGap {
                        expected: prev_seq + 1,
                        found: entry.seq,
                    });
                }
                if entry.prev_hash.as_deref() != Some(prev_hash.as_str()) {
                    return Err(ChainError::BrokenLink { seq: entry.seq });
                }
            }
        }

        let expected = compute_entry_hash(
            entry.seq,
            &entry.recorded_at,
            &entry.event,
            entry.prev_hash.as_deref(),
        );
        if expected != entry.entry_hash {
            return Err(ChainError::HashMismatch { seq: entry.seq });
        }

        self.previous = Some((entry.seq, entry.entry_hash.clone()));
        self.checked += 1;
        Ok(())
    }

    pub fn checked(&self) -> usize {
        self.checked
    }
}
