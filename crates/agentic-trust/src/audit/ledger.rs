//! Append-only, hash-chained audit log.
//!
//! Each entry's hash covers the previous entry's hash, so editing,
//! removing or reordering any entry breaks verification from that point
//! on. Corrections are new entries; nothing is rewritten.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto::canonical::to_canonical_string;
use crate::error::{Result, TrustError};
use crate::time::{Clock, SystemClock};

use super::entry::{AuditEntry, GENESIS_HASH};

/// Export encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// One canonical JSON object per line, in append order.
    Jsonl,
    /// A single JSON array.
    Json,
}

impl FromStr for ExportFormat {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jsonl" => Ok(Self::Jsonl),
            "json" => Ok(Self::Json),
            other => Err(TrustError::InvalidConfig(format!(
                "unknown export format: {other}"
            ))),
        }
    }
}

/// Filter for [`AuditLog::entries`].
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub agent_id: Option<String>,
    pub decision: Option<String>,
    /// Keep only the most recent `limit` matches.
    pub limit: Option<usize>,
}

/// Aggregate view of a log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total: usize,
    pub by_decision: BTreeMap<String, usize>,
    pub agents: usize,
    pub chain_valid: bool,
    pub head_hash: String,
}

/// The audit ledger. Shared across threads behind an `Arc`.
pub struct AuditLog {
    entries: RwLock<Vec<AuditEntry>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            clock,
        }
    }

    /// Wrap previously exported entries. Nothing is checked here;
    /// call [`AuditLog::verify_chain`] to validate them.
    pub fn from_entries(entries: Vec<AuditEntry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(entries),
            clock,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<AuditEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<AuditEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a decision. Indices are assigned under the write lock, so
    /// concurrent appenders never share an index or a previous hash.
    pub fn append(
        &self,
        agent_id: &str,
        action: &str,
        decision: &str,
        context: Option<Value>,
    ) -> Result<AuditEntry> {
        let context = context.unwrap_or_else(|| Value::Object(Default::default()));
        let mut entries = self.write();

        let previous_hash = entries
            .last()
            .map(|e| e.entry_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let index = entries.len() as u64;
        let entry = AuditEntry::new(
            index,
            self.clock.now_micros(),
            agent_id,
            action,
            decision,
            context,
            previous_hash,
        )
        .map_err(|e| TrustError::AuditFailure(e.to_string()))?;

        entries.push(entry.clone());
        log::debug!("audit #{index} {agent_id} {action} -> {decision}");
        Ok(entry)
    }

    /// Index of the first entry that fails verification, if any.
    pub fn first_invalid_index(&self) -> Option<u64> {
        first_invalid(&self.read())
    }

    /// Recompute every hash and check every link. The empty log is valid.
    pub fn verify_chain(&self) -> bool {
        match self.first_invalid_index() {
            None => true,
            Some(i) => {
                log::warn!("audit chain broken at entry {i}");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Hash of the newest entry, or the genesis hash.
    pub fn head_hash(&self) -> String {
        self.read()
            .last()
            .map(|e| e.entry_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string())
    }

    pub fn get(&self, index: u64) -> Option<AuditEntry> {
        let entries = self.read();
        usize::try_from(index)
            .ok()
            .and_then(|i| entries.get(i).cloned())
    }

    /// Copy of all entries in append order.
    pub fn snapshot(&self) -> Vec<AuditEntry> {
        self.read().clone()
    }

    pub fn entries(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        let entries = self.read();
        let matches: Vec<&AuditEntry> = entries
            .iter()
            .filter(|e| query.agent_id.as_deref().map_or(true, |a| e.agent_id == a))
            .filter(|e| query.decision.as_deref().map_or(true, |d| e.decision == d))
            .collect();
        let skip = query
            .limit
            .map_or(0, |limit| matches.len().saturating_sub(limit));
        matches.into_iter().skip(skip).cloned().collect()
    }

    pub fn summary(&self) -> AuditSummary {
        let entries = self.read();
        let mut by_decision = BTreeMap::new();
        let mut agents = std::collections::HashSet::new();
        for e in entries.iter() {
            *by_decision.entry(e.decision.clone()).or_insert(0) += 1;
            agents.insert(e.agent_id.as_str());
        }
        AuditSummary {
            total: entries.len(),
            by_decision,
            agents: agents.len(),
            chain_valid: first_invalid(&entries).is_none(),
            head_hash: entries
                .last()
                .map(|e| e.entry_hash.clone())
                .unwrap_or_else(|| GENESIS_HASH.to_string()),
        }
    }

    pub fn export(&self, format: ExportFormat) -> Result<String> {
        let entries = self.read();
        match format {
            ExportFormat::Jsonl => {
                let mut out = String::new();
                for e in entries.iter() {
                    out.push_str(&to_canonical_string(e)?);
                    out.push('\n');
                }
                Ok(out)
            }
            ExportFormat::Json => Ok(serde_json::to_string_pretty(&*entries)?),
        }
    }
}

/// Parse JSONL produced by [`AuditLog::export`]. Blank lines are skipped.
pub fn import_jsonl(input: &str) -> Result<Vec<AuditEntry>> {
    input
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(TrustError::from))
        .collect()
}

/// Parse a JSON array produced by [`AuditLog::export`].
pub fn import_json(input: &str) -> Result<Vec<AuditEntry>> {
    Ok(serde_json::from_str(input)?)
}

fn first_invalid(entries: &[AuditEntry]) -> Option<u64> {
    let mut expected_previous = GENESIS_HASH;
    for (i, entry) in entries.iter().enumerate() {
        if entry.index != i as u64
            || entry.previous_hash != expected_previous
            || !entry.hash_matches()
        {
            return Some(i as u64);
        }
        expected_previous = &entry.entry_hash;
    }
    None
}
