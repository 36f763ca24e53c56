//! Cryptographic primitives for AgenticTrust.
//!
//! This module provides:
//! - Ed25519 key generation, signing, and verification
//! - Canonical JSON encoding for signed and hashed payloads
//! - SHA-256 digests rendered as hex

pub mod canonical;
pub mod hashing;
pub mod keys;
pub mod signing;
