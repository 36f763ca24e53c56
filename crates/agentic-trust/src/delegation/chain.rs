//! Delegation chains: ordered, signed grants rooted at one authority.
//!
//! A chain `[A→B, B→C]` is valid when every link is unexpired, signed by
//! its delegator, and the delegator of link `i` is the delegatee of link
//! `i - 1`. The first link must come from the root. Signer keys are never
//! taken from the wire: link 0 is checked against the root key, and every
//! later link against the delegatee key signed into the link before it.
//! The chain is an append-only history; expired links stay in place and
//! are ignored when computing capabilities.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capability;
use crate::card::CapabilityCard;
use crate::crypto::keys::decode_public_key;
use crate::crypto::signing;
use crate::error::{Result, TrustError};
use crate::identity::{AgentIdentity, IdentityId};
use crate::time::{duration_to_micros, now_micros};

use super::record::Delegation;

/// An ordered sequence of delegations rooted at one authority identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationChain {
    /// The root authority (public half only).
    pub root: AgentIdentity,
    #[serde(default)]
    pub delegations: Vec<Delegation>,
    /// Identities this side has registered. Never serialized, so a chain
    /// received from a peer starts with none.
    #[serde(skip)]
    known_identities: BTreeMap<IdentityId, AgentIdentity>,
}

impl DelegationChain {
    /// Start an empty chain rooted at `root`.
    pub fn new(root: &AgentIdentity) -> Self {
        let root = root.public_only();
        let mut known_identities = BTreeMap::new();
        known_identities.insert(root.id.clone(), root.clone());
        Self {
            root,
            delegations: Vec::new(),
            known_identities,
        }
    }

    pub fn len(&self) -> usize {
        self.delegations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delegations.is_empty()
    }

    /// Pin a public identity. A pinned delegator must sign with the pinned
    /// key and must not be expired.
    pub fn register_identity(&mut self, identity: &AgentIdentity) {
        self.known_identities
            .insert(identity.id.clone(), identity.public_only());
    }

    /// Append a delegation received from elsewhere, unchecked.
    /// [`DelegationChain::verify`] decides whether it holds up.
    pub fn push(&mut self, delegation: Delegation) {
        self.delegations.push(delegation);
    }

    /// Sign and append a delegation from `delegator` to the card's identity.
    pub fn add<I, S>(
        &mut self,
        delegator: &AgentIdentity,
        delegatee_card: &CapabilityCard,
        capabilities: I,
        ttl: Option<Duration>,
    ) -> Result<Delegation>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_at(delegator, delegatee_card, capabilities, ttl, now_micros())
    }

    /// [`DelegationChain::add`] as of the given time.
    ///
    /// Only the root may grant capabilities it does not itself receive
    /// through the chain; any other delegator is limited to what its active
    /// delegations give it.
    pub fn add_at<I, S>(
        &mut self,
        delegator: &AgentIdentity,
        delegatee_card: &CapabilityCard,
        capabilities: I,
        ttl: Option<Duration>,
        now: u64,
    ) -> Result<Delegation>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let delegatee = delegatee_card.identity.as_ref().ok_or_else(|| {
            TrustError::MissingIdentity(format!(
                "card '{}' carries no identity",
                delegatee_card.name
            ))
        })?;
        let capabilities = capability::capability_set(capabilities);

        if delegator.id != self.root.id {
            let held = self.capabilities_for_at(&delegator.id, now);
            if let Some(cap) = capabilities
                .iter()
                .find(|cap| !capability::set_covers(&held, cap))
            {
                return Err(TrustError::CapabilityNotHeld(format!(
                    "{} cannot delegate '{cap}'",
                    delegator.id
                )));
            }
        }

        let expires_at = ttl.map(|t| now.saturating_add(duration_to_micros(t)));
        let payload = Delegation::signing_payload(
            &delegator.id,
            &delegatee.id,
            &delegatee.public_key,
            &capabilities,
            now,
            expires_at,
        )?;
        let signature = delegator.sign_at(&payload, now)?;

        let delegation = Delegation {
            delegator_id: delegator.id.clone(),
            delegatee_id: delegatee.id.clone(),
            delegatee_public_key: delegatee.public_key.clone(),
            capabilities,
            signature: signature.signature,
            created_at: now,
            expires_at,
        };

        self.register_identity(delegator);
        self.register_identity(delegatee);
        self.delegations.push(delegation.clone());
        log::debug!(
            "delegation {} -> {} appended at position {}",
            delegation.delegator_id,
            delegation.delegatee_id,
            self.delegations.len() - 1
        );
        Ok(delegation)
    }

    /// Walk the chain and report the first violation as `ChainBroken`.
    pub fn check_at(&self, now: u64) -> Result<()> {
        let mut previous: Option<&Delegation> = None;

        for (i, link) in self.delegations.iter().enumerate() {
            if !link.is_active_at(now) {
                return Err(TrustError::ChainBroken(format!("delegation {i} expired")));
            }

            let signer_key = match previous {
                None if link.delegator_id != self.root.id => {
                    return Err(TrustError::ChainBroken(format!(
                        "delegation 0: delegator {} is not the root",
                        link.delegator_id
                    )));
                }
                None => {
                    if self.root.is_expired_at(now) {
                        return Err(TrustError::ChainBroken(format!(
                            "delegation 0: root {} expired",
                            self.root.id
                        )));
                    }
                    self.root.public_key.as_str()
                }
                Some(prev) if prev.delegatee_id != link.delegator_id => {
                    return Err(TrustError::ChainBroken(format!(
                        "delegation {i}: delegator {} does not follow {}",
                        link.delegator_id, prev.delegatee_id
                    )));
                }
                Some(prev) => prev.delegatee_public_key.as_str(),
            };

            if let Some(known) = self.known_identities.get(&link.delegator_id) {
                if known.public_key != signer_key {
                    return Err(TrustError::ChainBroken(format!(
                        "delegation {i}: key for {} differs from its registered identity",
                        link.delegator_id
                    )));
                }
                if known.is_expired_at(now) {
                    return Err(TrustError::ChainBroken(format!(
                        "delegation {i}: delegator {} expired",
                        link.delegator_id
                    )));
                }
            }

            let key = decode_public_key(signer_key).map_err(|e| {
                TrustError::ChainBroken(format!("delegation {i}: {e}"))
            })?;
            let payload = link.payload()?;
            if signing::verify_b64(&key, &payload, &link.signature).is_err() {
                return Err(TrustError::ChainBroken(format!(
                    "delegation {i}: invalid signature"
                )));
            }

            previous = Some(link);
        }

        Ok(())
    }

    pub fn check(&self) -> Result<()> {
        self.check_at(now_micros())
    }

    /// Whether the whole chain holds up. An empty chain is valid.
    pub fn verify_at(&self, now: u64) -> bool {
        match self.check_at(now) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("delegation chain rooted at {} rejected: {e}", self.root.id);
                false
            }
        }
    }

    pub fn verify(&self) -> bool {
        self.verify_at(now_micros())
    }

    /// Union of capabilities from active delegations addressed to `agent_id`.
    pub fn capabilities_for_at(&self, agent_id: &IdentityId, now: u64) -> BTreeSet<String> {
        self.delegations
            .iter()
            .filter(|d| &d.delegatee_id == agent_id && d.is_active_at(now))
            .flat_map(|d| d.capabilities.iter().cloned())
            .collect()
    }

    pub fn capabilities_for(&self, agent_id: &IdentityId) -> BTreeSet<String> {
        self.capabilities_for_at(agent_id, now_micros())
    }

    /// Like [`DelegationChain::capabilities_for_at`], but a grant only counts
    /// when it was signed for this identity's key as well as its id.
    pub fn capabilities_for_identity_at(
        &self,
        identity: &AgentIdentity,
        now: u64,
    ) -> BTreeSet<String> {
        self.delegations
            .iter()
            .filter(|d| {
                d.delegatee_id == identity.id
                    && d.delegatee_public_key == identity.public_key
                    && d.is_active_at(now)
            })
            .flat_map(|d| d.capabilities.iter().cloned())
            .collect()
    }

    /// Next point after `now` at which a link, the root or a registered
    /// identity expires. Expiries already past cannot change the chain's
    /// verdict again.
    pub fn next_expiry_after(&self, now: u64) -> Option<u64> {
        let links = self.delegations.iter().filter_map(|d| d.expires_at);
        let identities = self
            .known_identities
            .values()
            .chain(std::iter::once(&self.root))
            .filter_map(|i| i.expires_at);
        links.chain(identities).filter(|exp| *exp > now).min()
    }
}
