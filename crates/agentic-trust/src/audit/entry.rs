//! Audit entries and their chain hash.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::crypto::canonical::canonicalize;
use crate::crypto::hashing::sha256_hex;
use crate::error::Result;

/// `previous_hash` of the first entry in every log.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

fn empty_context() -> Value {
    Value::Object(Default::default())
}

/// One immutable decision record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the log, starting at 0.
    pub index: u64,
    /// Microseconds since Unix epoch.
    pub timestamp: u64,
    pub agent_id: String,
    pub action: String,
    pub decision: String,
    #[serde(default = "empty_context")]
    pub context: Value,
    pub previous_hash: String,
    pub entry_hash: String,
}

impl AuditEntry {
    /// Build an entry and seal it with its hash.
    pub fn new(
        index: u64,
        timestamp: u64,
        agent_id: impl Into<String>,
        action: impl Into<String>,
        decision: impl Into<String>,
        context: Value,
        previous_hash: impl Into<String>,
    ) -> Result<Self> {
        let mut entry = Self {
            index,
            timestamp,
            agent_id: agent_id.into(),
            action: action.into(),
            decision: decision.into(),
            context,
            previous_hash: previous_hash.into(),
            entry_hash: String::new(),
        };
        entry.entry_hash = entry.compute_hash()?;
        Ok(entry)
    }

    /// SHA-256 over the canonical encoding of every field but `entry_hash`.
    pub fn compute_hash(&self) -> Result<String> {
        let body = json!({
            "index": self.index,
            "timestamp": self.timestamp,
            "agent_id": self.agent_id,
            "action": self.action,
            "decision": self.decision,
            "context": self.context,
            "previous_hash": self.previous_hash,
        });
        Ok(sha256_hex(canonicalize(&body)?.as_bytes()))
    }

    /// Whether the stored hash matches the entry's contents.
    pub fn hash_matches(&self) -> bool {
        self.compute_hash().is_ok_and(|h| h == self.entry_hash)
    }
}
