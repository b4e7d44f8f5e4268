//! Append-only audit log
//!
//! Shared by every session of a kernel. Entries are chained with SHA-256 so a
//! rewritten or deleted record breaks [`AuditLog::verify_integrity`]. Callers
//! can read snapshots but cannot append; only the gate records entries.

use crate::error::{AuditError, RefusalKind};
use crate::escalation::Assessment;
use crate::gate::OperationResult;
use crate::types::{EntryId, SessionId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Outcome of one gate call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub result: OperationResult,
    /// Set when the gate refused the call
    pub refusal: Option<RefusalKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecord {
    Assessment(Assessment),
    Operation(OperationRecord),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: EntryId,
    /// Position in the global log
    pub sequence: u64,
    pub session_id: SessionId,
    /// Position within the session, starting at 0 with no gaps
    pub session_sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub record: AuditRecord,
    pub prev_hash: [u8; 32],
    pub hash: [u8; 32],
}

impl AuditEntry {
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

#[derive(Debug, Default)]
struct Chain {
    entries: Vec<AuditEntry>,
    next_per_session: HashMap<SessionId, u64>,
}

#[derive(Debug, Default)]
pub struct AuditLog {
    inner: Mutex<Chain>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(
        &self,
        session_id: SessionId,
        recorded_at: DateTime<Utc>,
        record: AuditRecord,
    ) -> Result<u64, AuditError> {
        let mut chain = self.inner.lock();
        let sequence = chain.entries.len() as u64;
        let session_sequence = chain.next_per_session.get(&session_id).copied().unwrap_or(0);
        let prev_hash = chain.entries.last().map_or([0u8; 32], |e| e.hash);

        let mut entry = AuditEntry {
            entry_id: EntryId::new(),
            sequence,
            session_id,
            session_sequence,
            recorded_at,
            record,
            prev_hash,
            hash: [0u8; 32],
        };
        entry.hash = compute_hash(&entry)?;

        chain.entries.push(entry);
        chain.next_per_session.insert(session_id, session_sequence + 1);
        Ok(sequence)
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.inner.lock().entries.clone()
    }

    /// Entries of one session, in the order they were recorded
    pub fn entries_for(&self, session_id: SessionId) -> Vec<AuditEntry> {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn verify_integrity(&self) -> Result<(), AuditError> {
        let chain = self.inner.lock();
        let mut prev = [0u8; 32];
        for (i, e) in chain.entries.iter().enumerate() {
            let sequence = i as u64;
            if e.sequence != sequence || e.prev_hash != prev || e.hash != compute_hash(e)? {
                return Err(AuditError::IntegrityViolation { sequence });
            }
            prev = e.hash;
        }
        Ok(())
    }

    /// One JSON object per line, in global order
    pub fn to_json_lines(&self) -> Result<String, AuditError> {
        let chain = self.inner.lock();
        let mut out = String::new();
        for e in &chain.entries {
            out.push_str(&serde_json::to_string(e)?);
            out.push('\n');
        }
        Ok(out)
    }

    #[cfg(test)]
    pub(crate) fn tamper(&self, index: usize, f: impl FnOnce(&mut AuditEntry)) {
        if let Some(e) = self.inner.lock().entries.get_mut(index) {
            f(e);
        }
    }
}

fn compute_hash(entry: &AuditEntry) -> Result<[u8; 32], AuditError> {
    let mut hasher = Sha256::new();
    hasher.update(entry.entry_id.0.as_bytes());
    hasher.update(entry.sequence.to_le_bytes());
    hasher.update(entry.session_id.0.as_bytes());
    hasher.update(entry.session_sequence.to_le_bytes());
    hasher.update(entry.recorded_at.timestamp_micros().to_le_bytes());
    hasher.update(serde_json::to_vec(&entry.record)?);
    hasher.update([0]);
    hasher.update(entry.prev_hash);
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ThreatTier;

    fn record(name: &str, refusal: Option<RefusalKind>) -> AuditRecord {
        AuditRecord::Operation(OperationRecord {
            result: OperationResult {
                success: refusal.is_none(),
                blocked: refusal.is_some(),
                operation_name: name.to_string(),
                message: String::new(),
                threat_tier: ThreatTier::Safe,
            },
            refusal,
        })
    }

    #[test]
    fn appends_chain_and_verify() {
        let log = AuditLog::new();
        let s = SessionId::new();
        log.append(s, Utc::now(), record("status", None)).unwrap();
        log.append(s, Utc::now(), record("reset_hard", Some(RefusalKind::ConsentRequired)))
            .unwrap();

        assert_eq!(log.len(), 2);
        let entries = log.entries();
        assert_eq!(entries[0].prev_hash, [0u8; 32]);
        assert_eq!(entries[1].prev_hash, entries[0].hash);
        assert!(log.verify_integrity().is_ok());
    }

    #[test]
    fn per_session_sequences_are_independent() {
        let log = AuditLog::new();
        let a = SessionId::new();
        let b = SessionId::new();
        log.append(a, Utc::now(), record("a0", None)).unwrap();
        log.append(b, Utc::now(), record("b0", None)).unwrap();
        log.append(a, Utc::now(), record("a1", None)).unwrap();

        let seqs: Vec<u64> = log.entries_for(a).iter().map(|e| e.session_sequence).collect();
        assert_eq!(seqs, vec![0, 1]);
        assert_eq!(log.entries_for(b)[0].session_sequence, 0);
        assert_eq!(log.entries_for(b)[0].sequence, 1);
    }

    #[test]
    fn tampered_record_breaks_chain() {
        let log = AuditLog::new();
        let s = SessionId::new();
        for name in ["a", "b", "c"] {
            log.append(s, Utc::now(), record(name, None)).unwrap();
        }
        log.tamper(1, |e| e.record = record("rewritten", None));

        assert_eq!(
            log.verify_integrity(),
            Err(AuditError::IntegrityViolation { sequence: 1 })
        );
    }

    #[test]
    fn json_lines_export_has_one_line_per_entry() {
        let log = AuditLog::new();
        let s = SessionId::new();
        log.append(s, Utc::now(), record("a", None)).unwrap();
        log.append(s, Utc::now(), record("b", Some(RefusalKind::ConsentInvalid))).unwrap();

        let out = log.to_json_lines().unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: AuditEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.sequence, 1);
        assert!(matches!(
            parsed.record,
            AuditRecord::Operation(OperationRecord {
                refusal: Some(RefusalKind::ConsentInvalid),
                ..
            })
        ));
    }
}
