//! Gate outcomes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Three-way gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allow,
    Review,
    Deny,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Allow => "allow",
            Verdict::Review => "review",
            Verdict::Deny => "deny",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`TrustGate::evaluate`](super::TrustGate::evaluate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verdict: Verdict,
    /// True only for [`Verdict::Allow`].
    pub allowed: bool,
    pub reason: String,
    pub trust_score: f64,
    pub verified_capabilities: BTreeSet<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Seconds to wait before retrying, on rate-limit denials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Index of the audit entry recording this decision.
    pub audit_index: u64,
}

/// Decision counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateStats {
    pub total: u64,
    pub allowed: u64,
    pub review: u64,
    pub denied: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}
