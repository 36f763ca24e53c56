//! Trust handshake: policy, dynamic scores, rate limits and the gate that
//! combines them into a verdict.

pub mod cache;
pub mod policy;
pub mod rate_limit;
pub mod score;
pub mod trust_gate;
pub mod verdict;

pub use policy::{GatePolicy, RateLimitConfig, ScoringConfig};
pub use rate_limit::{RateDecision, RateLimiter, TokenBucket};
pub use score::{Dimension, TrustScore, TrustScorer, DIMENSION_WEIGHTS};
pub use trust_gate::{TrustGate, ANONYMOUS_AGENT};
pub use verdict::{GateStats, Verdict, VerificationResult};
