//! In-memory directory of verified peer cards.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::capability;
use crate::card::CapabilityCard;
use crate::error::{Result, TrustError};

use super::agent::IdentityId;

/// Peers known to this process, keyed by identity id.
///
/// Only cards whose signature verifies are admitted.
#[derive(Debug, Default)]
pub struct AgentDirectory {
    cards: RwLock<HashMap<IdentityId, CapabilityCard>>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<IdentityId, CapabilityCard>> {
        self.cards.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<IdentityId, CapabilityCard>> {
        self.cards.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register or replace a card. The card must carry an identity and a
    /// valid signature.
    pub fn register(&self, card: CapabilityCard) -> Result<()> {
        let id = card
            .agent_id()
            .cloned()
            .ok_or_else(|| TrustError::MissingIdentity(format!("card '{}'", card.name)))?;
        if !card.verify() {
            log::warn!("refusing to register {id}: card signature invalid");
            return Err(TrustError::InvalidSignature);
        }
        log::info!("registered {id} ({})", card.name);
        self.write().insert(id, card);
        Ok(())
    }

    pub fn get(&self, id: &IdentityId) -> Option<CapabilityCard> {
        self.read().get(id).cloned()
    }

    /// Cards offering a capability, honoring wildcard grants. Sorted by id.
    pub fn find_by_capability(&self, requested: &str) -> Vec<CapabilityCard> {
        self.collect_sorted(|card| capability::set_covers(&card.capabilities, requested))
    }

    /// Cards whose advertised trust score is at least `min_score`.
    pub fn trusted_above(&self, min_score: f64) -> Vec<CapabilityCard> {
        self.collect_sorted(|card| card.trust_score >= min_score)
    }

    pub fn list(&self) -> Vec<CapabilityCard> {
        self.collect_sorted(|_| true)
    }

    pub fn remove(&self, id: &IdentityId) -> Option<CapabilityCard> {
        self.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn collect_sorted<F>(&self, keep: F) -> Vec<CapabilityCard>
    where
        F: Fn(&CapabilityCard) -> bool,
    {
        let cards = self.read();
        let mut out: Vec<_> = cards.iter().filter(|(_, c)| keep(c)).collect();
        out.sort_by(|(a, _), (b, _)| a.cmp(b));
        out.into_iter().map(|(_, c)| c.clone()).collect()
    }
}
