//! Error types for AgenticTrust.
//!
//! Verification failures on untrusted input are not errors: they surface as
//! `false` or as a Deny verdict. The variants below cover programmer errors,
//! malformed construction input and infrastructure failures.
//! Private key material is never included in error messages.

/// Trust core error types covering all operations.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    #[error("Cannot sign: identity has no private key (peer identity)")]
    NoPrivateKey,

    #[error("Signature verification failed")]
    InvalidSignature,

    #[error("Delegation chain broken: {0}")]
    ChainBroken(String),

    #[error("Missing identity: {0}")]
    MissingIdentity(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Delegator does not hold capability: {0}")]
    CapabilityNotHeld(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Audit append failed: {0}")]
    AuditFailure(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for TrustError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, TrustError>;
