//! Detached signature encoding and strict verification.
//!
//! Verification goes through `verify_strict`, which rejects malleable and
//! small-order encodings. Every failure collapses into
//! [`TrustError::InvalidSignature`] so callers cannot tell a bad encoding
//! from a bad signature.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature, VerifyingKey};

use crate::error::{Result, TrustError};

pub fn encode_signature(signature: &Signature) -> String {
    STANDARD.encode(signature.to_bytes())
}

pub fn decode_signature(encoded: &str) -> Result<Signature> {
    let raw = STANDARD
        .decode(encoded)
        .map_err(|_| TrustError::InvalidSignature)?;
    let raw: [u8; 64] = raw.try_into().map_err(|_| TrustError::InvalidSignature)?;
    Ok(Signature::from_bytes(&raw))
}

/// Check a base64 signature over `message`.
pub fn verify_b64(key: &VerifyingKey, message: &[u8], signature: &str) -> Result<()> {
    let signature = decode_signature(signature)?;
    key.verify_strict(message, &signature)
        .map_err(|_| TrustError::InvalidSignature)
}
