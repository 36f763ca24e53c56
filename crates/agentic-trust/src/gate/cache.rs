//! Cache of cryptographic verification results.
//!
//! Only the expensive part of an evaluation is cached: card signature and
//! delegation chain checks, and the capabilities they yield. Policy checks
//! (blocklist, score, rate limit) always run. Entries are keyed by identity
//! id plus a public key prefix, fingerprinted by the signed card body, its
//! signature and the attached chain, and evicted lazily when looked up
//! past their expiry.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::card::CapabilityCard;
use crate::crypto::canonical::to_canonical_string;
use crate::crypto::hashing::sha256_hex;
use crate::error::Result;
use crate::identity::AgentIdentity;

const KEY_PREFIX_LEN: usize = 32;

/// A verified card's derived facts.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedVerification {
    pub fingerprint: String,
    pub capabilities: BTreeSet<String>,
    pub warnings: Vec<String>,
    pub expires_at: u64,
}

/// Cache key for an identity: `id:public-key-prefix`.
pub fn cache_key(identity: &AgentIdentity) -> String {
    let pk = &identity.public_key;
    let prefix = pk.get(..KEY_PREFIX_LEN).unwrap_or(pk);
    format!("{}:{prefix}", identity.id)
}

/// Digest of everything the cached result depends on: the signed
/// fields, the signature and the attached chain.
pub fn fingerprint(card: &CapabilityCard) -> Result<String> {
    let body = String::from_utf8_lossy(&card.signable_bytes()?).into_owned();
    let sig = card
        .signature
        .as_ref()
        .map(|s| s.signature.as_str())
        .unwrap_or_default();
    let chain = match &card.delegation_chain {
        Some(chain) => to_canonical_string(chain)?,
        None => String::new(),
    };
    Ok(sha256_hex(format!("{body}|{sig}|{chain}").as_bytes()))
}

#[derive(Debug, Default)]
pub struct VerificationCache {
    entries: Mutex<HashMap<String, CachedVerification>>,
}

impl VerificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedVerification>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a live entry with a matching fingerprint. Stale or
    /// mismatching entries are removed.
    pub fn get(&self, key: &str, fingerprint: &str, now: u64) -> Option<CachedVerification> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(hit) if hit.fingerprint == fingerprint && now < hit.expires_at => {
                Some(hit.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: String, entry: CachedVerification) {
        self.lock().insert(key, entry);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
