//! Agent key material.
//!
//! Public keys travel as base64 strings inside cards and delegations; the
//! 32-byte point is rebuilt only when something has to be verified. The
//! secret half never leaves [`AgentKeyPair`] and is wiped on drop by
//! `ed25519-dalek` itself.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};

use crate::error::{Result, TrustError};

use super::signing::encode_signature;

/// Signing half of an agent identity.
#[derive(Clone)]
pub struct AgentKeyPair {
    signing: SigningKey,
}

impl AgentKeyPair {
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// Base64 form of the public key, as carried on the wire.
    pub fn public_key_b64(&self) -> String {
        encode_public_key(&self.verifying_key())
    }

    /// Detached base64 signature over `data`.
    pub fn sign(&self, data: &[u8]) -> String {
        encode_signature(&self.signing.sign(data))
    }
}

impl std::fmt::Debug for AgentKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentKeyPair")
            .field("public_key", &self.public_key_b64())
            .finish_non_exhaustive()
    }
}

pub fn encode_public_key(key: &VerifyingKey) -> String {
    STANDARD.encode(key.as_bytes())
}

/// Parse a base64 public key. Fails on bad base64, wrong length or a
/// point that is not on the curve.
pub fn decode_public_key(encoded: &str) -> Result<VerifyingKey> {
    let raw = STANDARD
        .decode(encoded)
        .map_err(|e| TrustError::InvalidKey(format!("public key is not base64: {e}")))?;
    let raw: [u8; 32] = raw.try_into().map_err(|v: Vec<u8>| {
        TrustError::InvalidKey(format!("public key is {} bytes, expected 32", v.len()))
    })?;
    VerifyingKey::from_bytes(&raw)
        .map_err(|e| TrustError::InvalidKey(format!("not an Ed25519 point: {e}")))
}
