//! Agent identity: an Ed25519 key pair plus the capabilities it advertises.
//!
//! A locally owned identity carries its key pair and can sign. A peer
//! identity, received out of band, carries only the public key and can
//! verify but never sign.

use std::collections::BTreeSet;
use std::time::Duration;

use ed25519_dalek::VerifyingKey;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::capability;
use crate::crypto::hashing::sha256;
use crate::crypto::keys::{decode_public_key, AgentKeyPair};
use crate::crypto::signing;
use crate::error::{Result, TrustError};
use crate::time::{duration_to_micros, now_micros};

/// Method prefix for identity ids.
pub const ID_PREFIX: &str = "did:atrust:";

/// Unique identifier for an agent identity.
///
/// Format: `did:atrust:` + base58 of the first 16 bytes of
/// SHA-256(public_key || seed), where the seed is random per identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub String);

impl IdentityId {
    /// Derive an id from a public key and a uniqueness seed.
    pub fn derive(key: &VerifyingKey, seed: &[u8]) -> Self {
        let mut material = Vec::with_capacity(32 + seed.len());
        material.extend_from_slice(key.as_bytes());
        material.extend_from_slice(seed);
        let digest = sha256(&material);
        let encoded = bs58::encode(&digest[..16]).into_string();
        Self(format!("{ID_PREFIX}{encoded}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for IdentityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A detached signature together with the key that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Base64 public key of the signer.
    pub signer_public_key: String,
    /// Base64 Ed25519 signature bytes.
    pub signature: String,
    /// When the signature was made (microseconds since epoch).
    pub timestamp: u64,
}

/// An agent's cryptographic identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub id: IdentityId,
    pub name: String,
    /// Base64-encoded Ed25519 public key.
    pub public_key: String,
    #[serde(skip)]
    key_pair: Option<AgentKeyPair>,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl AgentIdentity {
    /// Generate a fresh identity with a new key pair.
    pub fn generate<I, S>(name: impl Into<String>, capabilities: I, ttl: Option<Duration>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::generate_at(name, capabilities, ttl, now_micros())
    }

    /// Generate a fresh identity as of the given time.
    pub fn generate_at<I, S>(
        name: impl Into<String>,
        capabilities: I,
        ttl: Option<Duration>,
        now: u64,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key_pair = AgentKeyPair::generate();
        let mut seed = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut seed);

        let id = IdentityId::derive(&key_pair.verifying_key(), &seed);
        let public_key = key_pair.public_key_b64();
        let name = name.into();
        log::debug!("generated identity {id} for {name}");

        Self {
            id,
            name,
            public_key,
            key_pair: Some(key_pair),
            capabilities: capability::capability_set(capabilities),
            created_at: now,
            expires_at: ttl.map(|t| now.saturating_add(duration_to_micros(t))),
        }
    }

    /// Build a peer identity from public data received out of band.
    ///
    /// Fails if the public key does not decode to a valid Ed25519 point.
    pub fn peer(
        id: IdentityId,
        name: impl Into<String>,
        public_key: impl Into<String>,
        capabilities: BTreeSet<String>,
        created_at: u64,
        expires_at: Option<u64>,
    ) -> Result<Self> {
        let public_key = public_key.into();
        decode_public_key(&public_key)?;
        Ok(Self {
            id,
            name: name.into(),
            public_key,
            key_pair: None,
            capabilities,
            created_at,
            expires_at,
        })
    }

    /// Whether this identity holds its private key.
    pub fn can_sign(&self) -> bool {
        self.key_pair.is_some()
    }

    /// Copy of this identity without the private key.
    pub fn public_only(&self) -> Self {
        Self {
            key_pair: None,
            ..self.clone()
        }
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_micros())
    }

    /// Whether the identity advertises a capability (wildcards honored).
    pub fn has_capability(&self, requested: &str) -> bool {
        capability::set_covers(&self.capabilities, requested)
    }

    /// Decode the public key.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        decode_public_key(&self.public_key)
    }

    /// Sign a byte string.
    pub fn sign(&self, data: &[u8]) -> Result<Signature> {
        self.sign_at(data, now_micros())
    }

    /// Sign a byte string, stamping the signature with `now`.
    pub fn sign_at(&self, data: &[u8], now: u64) -> Result<Signature> {
        let kp = self.key_pair.as_ref().ok_or(TrustError::NoPrivateKey)?;
        Ok(Signature {
            signer_public_key: self.public_key.clone(),
            signature: kp.sign(data),
            timestamp: now,
        })
    }

    /// Verify a signature over `data`. Never fails loudly: any mismatch,
    /// malformed encoding or expiry yields `false`.
    pub fn verify(&self, data: &[u8], signature: &Signature) -> bool {
        self.verify_at(data, signature, now_micros())
    }

    pub fn verify_at(&self, data: &[u8], signature: &Signature, now: u64) -> bool {
        if signature.signer_public_key != self.public_key {
            return false;
        }
        self.verify_detached_at(data, &signature.signature, now)
    }

    /// Verify a bare base64 signature against this identity's key.
    pub fn verify_detached_at(&self, data: &[u8], signature_b64: &str, now: u64) -> bool {
        if self.is_expired_at(now) {
            return false;
        }
        match self.verifying_key() {
            Ok(key) => signing::verify_b64(&key, data, signature_b64).is_ok(),
            Err(_) => false,
        }
    }
}
