//! JSON-shaped entry points for host frameworks.
//!
//! Agent SDKs, flow engines and proxies call the core through these four
//! operations. Inputs and outputs are plain JSON values so a host only has
//! to translate its own request shapes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audit::AuditLog;
use crate::card::CapabilityCard;
use crate::error::Result;
use crate::gate::{GatePolicy, TrustGate, TrustScore};
use crate::time::Clock;

/// Output of [`TrustCore::evaluate_trust`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustEvaluation {
    pub allowed: bool,
    pub reason: String,
    pub trust_score: f64,
    pub verified_capabilities: Vec<String>,
}

/// Output of [`TrustCore::append_audit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReceipt {
    pub entry_id: u64,
    pub chain_hash: String,
}

/// A gate plus its audit log behind a host-friendly surface.
#[derive(Debug)]
pub struct TrustCore {
    gate: TrustGate,
}

impl TrustCore {
    pub fn new(policy: GatePolicy) -> Result<Self> {
        Ok(Self::from_gate(TrustGate::new(policy)?))
    }

    pub fn with_clock(policy: GatePolicy, clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self::from_gate(TrustGate::with_clock(policy, clock)?))
    }

    pub fn from_gate(gate: TrustGate) -> Self {
        Self { gate }
    }

    pub fn gate(&self) -> &TrustGate {
        &self.gate
    }

    pub fn audit_log(&self) -> &Arc<AuditLog> {
        self.gate.audit_log()
    }

    /// Whether a JSON card is well-formed and validly signed.
    pub fn verify_card(&self, card: &Value) -> bool {
        match CapabilityCard::deserialize(card) {
            Ok(card) => card.verify_at(self.gate.now()),
            Err(e) => {
                log::debug!("verify_card: malformed card: {e}");
                false
            }
        }
    }

    /// Run a JSON card through the gate. A card that does not parse is an
    /// error; a card that parses but fails any check is a denial.
    pub fn evaluate_trust(
        &self,
        card: &Value,
        required_capabilities: &[String],
        min_trust: f64,
    ) -> Result<TrustEvaluation> {
        let card = CapabilityCard::deserialize(card)?;
        let result = self
            .gate
            .evaluate(&card, required_capabilities, Some(min_trust))?;
        Ok(TrustEvaluation {
            allowed: result.allowed,
            reason: result.reason,
            trust_score: result.trust_score,
            verified_capabilities: result.verified_capabilities.into_iter().collect(),
        })
    }

    /// Feed an observed outcome back into the agent's trust score.
    pub fn record_outcome(&self, agent_id: &str, success: bool) -> TrustScore {
        if success {
            self.gate.record_success(agent_id, &[])
        } else {
            self.gate.record_failure(agent_id, &[])
        }
    }

    /// Append a host-side decision to the shared audit log.
    pub fn append_audit(
        &self,
        agent_id: &str,
        action: &str,
        decision: &str,
        context: Value,
    ) -> Result<AuditReceipt> {
        let entry = self
            .gate
            .audit_log()
            .append(agent_id, action, decision, Some(context))?;
        Ok(AuditReceipt {
            entry_id: entry.index,
            chain_hash: entry.entry_hash,
        })
    }
}
