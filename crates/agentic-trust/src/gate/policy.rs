//! Gate configuration.
//!
//! Every field has a default, so a partial JSON document is enough:
//!
//! ```json
//! { "min_trust_score": 0.6, "review_threshold": 0.3,
//!   "rate_limit": { "max_requests": 10, "window_secs": 60 } }
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::crypto::keys::decode_public_key;
use crate::error::{Result, TrustError};

/// Token bucket sizing: `max_requests` per `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: f64,
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 || !(self.window_secs > 0.0) || !self.window_secs.is_finite() {
            return Err(TrustError::InvalidConfig(
                "rate_limit needs max_requests > 0 and a positive window_secs".into(),
            ));
        }
        Ok(())
    }
}

/// Dynamic trust score tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Initial value of every dimension for a newly seen agent.
    pub default_score: f64,
    /// Added per success.
    pub reward: f64,
    /// Subtracted per failure.
    pub penalty: f64,
    /// Subtracted from every dimension per elapsed hour.
    pub decay_per_hour: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            default_score: 1.0,
            reward: 0.05,
            penalty: 0.10,
            decay_per_hour: 0.01,
        }
    }
}

/// What a [`TrustGate`](super::TrustGate) demands of a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatePolicy {
    /// Trusted threshold: at or above this the peer is allowed.
    pub min_trust_score: f64,
    /// Scores in `[review_threshold, min_trust_score)` get a Review verdict.
    pub review_threshold: Option<f64>,
    pub require_identity: bool,
    /// Identity ids must start with this.
    pub id_prefix: String,
    pub blocked_ids: BTreeSet<String>,
    /// When non-empty, only these ids pass.
    pub allowed_ids: BTreeSet<String>,
    /// Base64 root keys whose delegation chains are honored. When empty,
    /// any chain that verifies is honored.
    pub trusted_roots: BTreeSet<String>,
    /// Lifetime of cached verifications; 0 disables caching.
    pub cache_ttl_secs: u64,
    pub rate_limit: Option<RateLimitConfig>,
    pub scoring: ScoringConfig,
    /// Rate-limit and audit action name when the caller gives none.
    pub default_action: String,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            min_trust_score: 0.7,
            review_threshold: None,
            require_identity: true,
            id_prefix: "did:".to_string(),
            blocked_ids: BTreeSet::new(),
            allowed_ids: BTreeSet::new(),
            trusted_roots: BTreeSet::new(),
            cache_ttl_secs: 900,
            rate_limit: None,
            scoring: ScoringConfig::default(),
            default_action: "evaluate".to_string(),
        }
    }
}

impl GatePolicy {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let policy: Self = serde_json::from_str(s)
            .map_err(|e| TrustError::InvalidConfig(format!("policy: {e}")))?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn with_min_trust(mut self, score: f64) -> Self {
        self.min_trust_score = score;
        self
    }

    pub fn with_review_threshold(mut self, score: f64) -> Self {
        self.review_threshold = Some(score);
        self
    }

    pub fn with_rate_limit(mut self, max_requests: u32, window_secs: f64) -> Self {
        self.rate_limit = Some(RateLimitConfig {
            max_requests,
            window_secs,
        });
        self
    }

    pub fn with_cache_ttl(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = secs;
        self
    }

    pub fn block(mut self, id: impl Into<String>) -> Self {
        self.blocked_ids.insert(id.into());
        self
    }

    pub fn allow(mut self, id: impl Into<String>) -> Self {
        self.allowed_ids.insert(id.into());
        self
    }

    /// Honor delegation chains rooted at this base64 public key.
    pub fn trust_root(mut self, public_key: impl Into<String>) -> Self {
        self.trusted_roots.insert(public_key.into());
        self
    }

    /// Reject inconsistent settings.
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f64| -> Result<()> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(TrustError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {v}"
                )))
            }
        };

        unit("min_trust_score", self.min_trust_score)?;
        if let Some(review) = self.review_threshold {
            unit("review_threshold", review)?;
            if review >= self.min_trust_score {
                return Err(TrustError::InvalidConfig(format!(
                    "review_threshold ({review}) must be less than min_trust_score ({})",
                    self.min_trust_score
                )));
            }
        }

        if let Some(rl) = &self.rate_limit {
            rl.validate()?;
        }

        for root in &self.trusted_roots {
            decode_public_key(root)
                .map_err(|e| TrustError::InvalidConfig(format!("trusted_roots: {e}")))?;
        }

        let s = &self.scoring;
        unit("scoring.default_score", s.default_score)?;
        unit("scoring.reward", s.reward)?;
        unit("scoring.penalty", s.penalty)?;
        if s.penalty < s.reward {
            return Err(TrustError::InvalidConfig(format!(
                "scoring.penalty ({}) must not be smaller than scoring.reward ({})",
                s.penalty, s.reward
            )));
        }
        if !(s.decay_per_hour >= 0.0) || !s.decay_per_hour.is_finite() {
            return Err(TrustError::InvalidConfig(
                "scoring.decay_per_hour must be a non-negative number".into(),
            ));
        }

        if self.default_action.is_empty() {
            return Err(TrustError::InvalidConfig(
                "default_action must not be empty".into(),
            ));
        }
        Ok(())
    }
}
