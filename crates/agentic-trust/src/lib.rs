//! AgenticTrust — trust core for AI agents.
//!
//! Provides Ed25519 agent identities, signed capability cards, verifiable
//! delegation chains, a trust gate with dynamic scoring and rate limiting,
//! and a hash-chained audit log of every gate decision.

pub mod audit;
pub mod capability;
pub mod card;
pub mod crypto;
pub mod delegation;
pub mod error;
pub mod gate;
pub mod host;
pub mod identity;
pub mod time;

// Re-export primary types
pub use audit::{AuditEntry, AuditLog, AuditQuery, AuditSummary, ExportFormat, GENESIS_HASH};
pub use card::{CapabilityCard, EffectiveCapabilities, UserContext};
pub use delegation::{Delegation, DelegationChain};
pub use error::{Result, TrustError};
pub use gate::{
    Dimension, GatePolicy, GateStats, RateLimitConfig, ScoringConfig, TrustGate, TrustScore,
    Verdict, VerificationResult,
};
pub use host::{AuditReceipt, TrustCore, TrustEvaluation};
pub use identity::{AgentDirectory, AgentIdentity, IdentityId, Signature};
pub use time::{Clock, ManualClock, SystemClock};
