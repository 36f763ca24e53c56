//! Capability cards: a signed statement of what an identity offers.
//!
//! The signature covers the canonical encoding of
//! `{name, description, capabilities, trust_score, identity_id,
//! identity_public_key}`. The delegation chain, user context and metadata
//! ride along unsigned; the chain is verified on its own so it can be
//! replaced without re-signing the card.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::capability;
use crate::crypto::canonical::canonicalize;
use crate::delegation::DelegationChain;
use crate::error::{Result, TrustError};
use crate::identity::{AgentIdentity, Signature};
use crate::time::now_micros;

use super::user_context::UserContext;

fn default_trust_score() -> f64 {
    0.5
}

/// A signed, serializable advertisement of capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityCard {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<AgentIdentity>,
    #[serde(default = "default_trust_score")]
    pub trust_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation_chain: Option<DelegationChain>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_context: Option<UserContext>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Capabilities a card may exercise right now, with any caveats.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectiveCapabilities {
    pub capabilities: BTreeSet<String>,
    /// Set when an attached chain was ignored.
    pub warnings: Vec<String>,
}

impl CapabilityCard {
    /// An unsigned card.
    pub fn new<I, S>(
        name: impl Into<String>,
        description: impl Into<String>,
        capabilities: I,
        trust_score: f64,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            description: description.into(),
            capabilities: capability::capability_set(capabilities),
            identity: None,
            trust_score,
            signature: None,
            delegation_chain: None,
            user_context: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_chain(mut self, chain: DelegationChain) -> Self {
        self.delegation_chain = Some(chain);
        self
    }

    pub fn with_user_context(mut self, ctx: UserContext) -> Self {
        self.user_context = Some(ctx);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Id of the attached identity, if any.
    pub fn agent_id(&self) -> Option<&crate::identity::IdentityId> {
        self.identity.as_ref().map(|i| &i.id)
    }

    fn signable_bytes_for(&self, identity: &AgentIdentity) -> Result<Vec<u8>> {
        let value = json!({
            "name": self.name,
            "description": self.description,
            "capabilities": self.capabilities,
            "trust_score": self.trust_score,
            "identity_id": identity.id,
            "identity_public_key": identity.public_key,
        });
        Ok(canonicalize(&value)?.into_bytes())
    }

    /// Canonical bytes covered by the card signature.
    pub fn signable_bytes(&self) -> Result<Vec<u8>> {
        let identity = self
            .identity
            .as_ref()
            .ok_or_else(|| TrustError::MissingIdentity(format!("card '{}'", self.name)))?;
        self.signable_bytes_for(identity)
    }

    /// Sign with `identity`, attaching its public half. Replaces any prior
    /// signature.
    pub fn sign(&mut self, identity: &AgentIdentity) -> Result<()> {
        self.sign_at(identity, now_micros())
    }

    pub fn sign_at(&mut self, identity: &AgentIdentity, now: u64) -> Result<()> {
        let bytes = self.signable_bytes_for(identity)?;
        let signature = identity.sign_at(&bytes, now)?;
        self.identity = Some(identity.public_only());
        self.signature = Some(signature);
        Ok(())
    }

    /// Whether the card is signed by its attached identity over its
    /// current contents.
    pub fn verify(&self) -> bool {
        self.verify_at(now_micros())
    }

    pub fn verify_at(&self, now: u64) -> bool {
        let (Some(identity), Some(signature)) = (&self.identity, &self.signature) else {
            return false;
        };
        match self.signable_bytes_for(identity) {
            Ok(bytes) => identity.verify_at(&bytes, signature, now),
            Err(_) => false,
        }
    }

    /// Own capabilities plus whatever an attached, valid chain delegates to
    /// this card's identity.
    pub fn effective_capabilities(&self) -> EffectiveCapabilities {
        self.effective_capabilities_at(now_micros())
    }

    pub fn effective_capabilities_at(&self, now: u64) -> EffectiveCapabilities {
        self.effective_capabilities_trusting_at(&BTreeSet::new(), now)
    }

    /// [`CapabilityCard::effective_capabilities_at`] honoring only chains
    /// whose root key is in `trusted_roots`. An empty set accepts any root.
    pub fn effective_capabilities_trusting_at(
        &self,
        trusted_roots: &BTreeSet<String>,
        now: u64,
    ) -> EffectiveCapabilities {
        let mut result = EffectiveCapabilities {
            capabilities: self.capabilities.clone(),
            warnings: Vec::new(),
        };

        let Some(chain) = &self.delegation_chain else {
            return result;
        };
        let Some(identity) = &self.identity else {
            result
                .warnings
                .push("delegation chain ignored: card has no identity".into());
            return result;
        };

        if !trusted_roots.is_empty() && !trusted_roots.contains(&chain.root.public_key) {
            log::warn!(
                "card '{}': delegation root {} is not trusted",
                self.name,
                chain.root.id
            );
            result.warnings.push(format!(
                "delegation chain ignored: root {} is not trusted",
                chain.root.id
            ));
            return result;
        }

        match chain.check_at(now) {
            Ok(()) => {
                result
                    .capabilities
                    .extend(chain.capabilities_for_identity_at(identity, now));
            }
            Err(e) => {
                log::warn!("card '{}': {e}", self.name);
                result
                    .warnings
                    .push(format!("delegation chain invalid or expired: {e}"));
            }
        }
        result
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}
