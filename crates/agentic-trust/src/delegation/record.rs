//! A single signed delegation: "A grants capabilities X to B, until T".

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::crypto::canonical::canonicalize;
use crate::error::Result;
use crate::identity::IdentityId;

/// A signed, optionally time-bounded capability grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator_id: IdentityId,
    pub delegatee_id: IdentityId,
    /// Base64 key of the delegatee. Signed, so the next link's signature
    /// can be checked without trusting keys shipped alongside the chain.
    pub delegatee_public_key: String,
    pub capabilities: BTreeSet<String>,
    /// Base64 Ed25519 signature by the delegator over [`Delegation::payload`].
    pub signature: String,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl Delegation {
    /// Canonical bytes a delegator signs.
    pub fn signing_payload(
        delegator_id: &IdentityId,
        delegatee_id: &IdentityId,
        delegatee_public_key: &str,
        capabilities: &BTreeSet<String>,
        created_at: u64,
        expires_at: Option<u64>,
    ) -> Result<Vec<u8>> {
        let value = json!({
            "delegator_id": delegator_id,
            "delegatee_id": delegatee_id,
            "delegatee_public_key": delegatee_public_key,
            "capabilities": capabilities,
            "created_at": created_at,
            "expires_at": expires_at,
        });
        Ok(canonicalize(&value)?.into_bytes())
    }

    /// Canonical bytes this delegation's signature covers.
    pub fn payload(&self) -> Result<Vec<u8>> {
        Self::signing_payload(
            &self.delegator_id,
            &self.delegatee_id,
            &self.delegatee_public_key,
            &self.capabilities,
            self.created_at,
            self.expires_at,
        )
    }

    /// Active while `now` is before the expiry, or forever without one.
    pub fn is_active_at(&self, now: u64) -> bool {
        self.expires_at.map_or(true, |exp| now < exp)
    }
}
