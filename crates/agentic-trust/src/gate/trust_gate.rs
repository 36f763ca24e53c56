//! The trust gate: decides whether a peer may proceed.
//!
//! Checks run in a fixed order and the first failure denies:
//!
//! 1. identity present, well-formed, unexpired, card signature valid
//! 2. on-behalf-of context unexpired
//! 3. blocklist
//! 4. allowlist (when configured)
//! 5. trust score (may yield Review instead of Deny)
//! 6. required capabilities, including valid delegations from trusted roots
//! 7. rate limit per `(agent, action)`
//!
//! Every decision, including denials, is appended to the audit log before
//! it is returned. If the append fails, so does the evaluation.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::json;

use crate::audit::AuditLog;
use crate::capability::missing_capabilities;
use crate::card::CapabilityCard;
use crate::error::Result;
use crate::identity::AgentIdentity;
use crate::time::{Clock, SystemClock, MICROS_PER_SEC};

use super::cache::{cache_key, fingerprint, CachedVerification, VerificationCache};
use super::policy::GatePolicy;
use super::rate_limit::{RateDecision, RateLimiter};
use super::score::{Dimension, TrustScore, TrustScorer};
use super::verdict::{GateStats, Verdict, VerificationResult};

/// Agent id recorded for cards without an identity.
pub const ANONYMOUS_AGENT: &str = "anonymous";

/// Working state of one evaluation.
#[derive(Debug)]
struct Decision {
    verdict: Verdict,
    reason: String,
    trust_score: f64,
    capabilities: std::collections::BTreeSet<String>,
    warnings: Vec<String>,
    retry_after: Option<f64>,
    agent_id: Option<String>,
}

impl Decision {
    fn new(card: &CapabilityCard) -> Self {
        Self {
            verdict: Verdict::Deny,
            reason: String::new(),
            trust_score: card.trust_score,
            capabilities: Default::default(),
            warnings: Vec::new(),
            retry_after: None,
            agent_id: None,
        }
    }

    fn deny(mut self, reason: impl Into<String>) -> Self {
        self.verdict = Verdict::Deny;
        self.reason = reason.into();
        self
    }
}

/// Evaluates peers against a [`GatePolicy`].
///
/// All state (scores, verification cache, rate buckets, counters) lives in
/// the gate and is guarded by its own locks, so a gate can be shared
/// across threads behind an `Arc` and several gates can coexist.
pub struct TrustGate {
    policy: GatePolicy,
    scorer: TrustScorer,
    cache: VerificationCache,
    limiter: Option<RateLimiter>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    stats: Mutex<GateStats>,
}

impl std::fmt::Debug for TrustGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustGate")
            .field("policy", &self.policy)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl TrustGate {
    /// A gate on the system clock with a fresh audit log.
    pub fn new(policy: GatePolicy) -> Result<Self> {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    /// A gate reading time from `clock`; its audit log shares the clock.
    pub fn with_clock(policy: GatePolicy, clock: Arc<dyn Clock>) -> Result<Self> {
        let audit = Arc::new(AuditLog::with_clock(clock.clone()));
        Self::with_parts(policy, clock, audit)
    }

    /// A gate writing to an existing audit log.
    pub fn with_parts(
        policy: GatePolicy,
        clock: Arc<dyn Clock>,
        audit: Arc<AuditLog>,
    ) -> Result<Self> {
        policy.validate()?;
        let limiter = policy.rate_limit.map(RateLimiter::new).transpose()?;
        Ok(Self {
            scorer: TrustScorer::new(policy.scoring),
            cache: VerificationCache::new(),
            limiter,
            audit,
            clock,
            stats: Mutex::new(GateStats::default()),
            policy,
        })
    }

    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn now(&self) -> u64 {
        self.clock.now_micros()
    }

    fn lock_stats(&self) -> MutexGuard<'_, GateStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Evaluate a card under the policy's default action.
    ///
    /// `min_trust` overrides the policy's trusted threshold for this call.
    pub fn evaluate(
        &self,
        card: &CapabilityCard,
        required_capabilities: &[String],
        min_trust: Option<f64>,
    ) -> Result<VerificationResult> {
        self.evaluate_action(card, required_capabilities, min_trust, None)
    }

    /// Evaluate a card for a named action. The action keys the rate limit
    /// and is recorded in the audit entry.
    pub fn evaluate_action(
        &self,
        card: &CapabilityCard,
        required_capabilities: &[String],
        min_trust: Option<f64>,
        action: Option<&str>,
    ) -> Result<VerificationResult> {
        let now = self.now();
        let action = action.unwrap_or(&self.policy.default_action);
        let threshold = min_trust.unwrap_or(self.policy.min_trust_score);
        // The review band only exists below the threshold in force.
        let review = self.policy.review_threshold.filter(|r| *r < threshold);

        let decision = self.decide(card, required_capabilities, threshold, review, action, now);
        self.record(decision, action, required_capabilities)
    }

    fn decide(
        &self,
        card: &CapabilityCard,
        required: &[String],
        threshold: f64,
        review: Option<f64>,
        action: &str,
        now: u64,
    ) -> Decision {
        let mut d = Decision::new(card);

        let agent_id = match &card.identity {
            Some(identity) => {
                d.agent_id = Some(identity.id.to_string());
                if !identity.id.as_str().starts_with(&self.policy.id_prefix) {
                    return d.deny(format!(
                        "identity id {} does not start with '{}'",
                        identity.id, self.policy.id_prefix
                    ));
                }
                if identity.is_expired_at(now) {
                    return d.deny(format!("identity {} expired", identity.id));
                }
                match self.verified(card, identity, now) {
                    Some(v) => {
                        d.capabilities = v.capabilities;
                        d.warnings = v.warnings;
                    }
                    None => return d.deny("card signature invalid"),
                }
                identity.id.to_string()
            }
            None if self.policy.require_identity => {
                return d.deny("card carries no identity");
            }
            None => {
                d.capabilities = card.capabilities.clone();
                d.warnings
                    .push("card has no identity; capabilities are unverified".into());
                ANONYMOUS_AGENT.to_string()
            }
        };

        if let Some(ctx) = &card.user_context {
            if !ctx.is_valid_at(now) {
                return d.deny(format!("user context expired for {}", ctx.user_id));
            }
        }

        if self.policy.blocked_ids.contains(&agent_id) {
            return d.deny(format!("agent {agent_id} is blocked"));
        }
        if !self.policy.allowed_ids.is_empty() && !self.policy.allowed_ids.contains(&agent_id) {
            return d.deny(format!("agent {agent_id} is not on the allowlist"));
        }

        let dynamic = self.scorer.get(&agent_id, now).overall;
        let score = card.trust_score.min(dynamic);
        d.trust_score = score;
        let mut review_reason = None;
        if score < threshold {
            match review {
                Some(r) if score >= r => {
                    review_reason = Some(format!(
                        "trust score {score:.2} is in the review band [{r:.2}, {threshold:.2})"
                    ));
                }
                _ => {
                    return d.deny(format!(
                        "trust score {score:.2} below minimum {threshold:.2}"
                    ));
                }
            }
        }

        let missing = missing_capabilities(&d.capabilities, required);
        if !missing.is_empty() {
            let mut reason = format!("missing capabilities: {}", missing.join(", "));
            if let Some(w) = d.warnings.iter().find(|w| w.starts_with("delegation chain")) {
                reason.push_str(&format!(" ({w})"));
            }
            return d.deny(reason);
        }

        if let Some(limiter) = &self.limiter {
            if let RateDecision::Limited { retry_after_secs } =
                limiter.consume(&agent_id, action, now)
            {
                d.retry_after = Some(retry_after_secs);
                return d.deny(format!(
                    "rate limit exceeded for {action}; retry after {retry_after_secs:.1}s"
                ));
            }
        }

        match review_reason {
            Some(reason) => {
                d.verdict = Verdict::Review;
                d.reason = reason;
            }
            None => {
                d.verdict = Verdict::Allow;
                d.reason = "all trust checks passed".into();
            }
        }
        d
    }

    /// Signature and chain verification, served from cache when possible.
    /// `None` means the card signature does not verify.
    fn verified(
        &self,
        card: &CapabilityCard,
        identity: &AgentIdentity,
        now: u64,
    ) -> Option<CachedVerification> {
        let ttl = self.policy.cache_ttl_secs;
        let key = cache_key(identity);
        let fp = fingerprint(card).ok()?;

        if ttl > 0 {
            if let Some(hit) = self.cache.get(&key, &fp, now) {
                self.lock_stats().cache_hits += 1;
                log::debug!("verification cache hit for {}", identity.id);
                return Some(hit);
            }
            self.lock_stats().cache_misses += 1;
        }

        if !card.verify_at(now) {
            return None;
        }
        let effective =
            card.effective_capabilities_trusting_at(&self.policy.trusted_roots, now);

        let chain_expiry = card
            .delegation_chain
            .as_ref()
            .and_then(|c| c.next_expiry_after(now));
        let expires_at = [identity.expires_at, chain_expiry]
            .into_iter()
            .flatten()
            .fold(now.saturating_add(ttl.saturating_mul(MICROS_PER_SEC)), u64::min);

        let entry = CachedVerification {
            fingerprint: fp,
            capabilities: effective.capabilities,
            warnings: effective.warnings,
            expires_at,
        };
        if ttl > 0 {
            self.cache.insert(key, entry.clone());
        }
        Some(entry)
    }

    fn record(
        &self,
        d: Decision,
        action: &str,
        required: &[String],
    ) -> Result<VerificationResult> {
        let agent = d.agent_id.as_deref().unwrap_or(ANONYMOUS_AGENT);
        let context = json!({
            "reason": d.reason,
            "trust_score": d.trust_score,
            "required_capabilities": required,
            "retry_after": d.retry_after,
        });
        let entry = self
            .audit
            .append(agent, action, d.verdict.as_str(), Some(context))?;

        {
            let mut stats = self.lock_stats();
            stats.total += 1;
            match d.verdict {
                Verdict::Allow => stats.allowed += 1,
                Verdict::Review => stats.review += 1,
                Verdict::Deny => stats.denied += 1,
            }
        }
        match d.verdict {
            Verdict::Deny => log::warn!("deny {agent} ({action}): {}", d.reason),
            v => log::info!("{v} {agent} ({action}): {}", d.reason),
        }

        Ok(VerificationResult {
            allowed: d.verdict == Verdict::Allow,
            verdict: d.verdict,
            reason: d.reason,
            trust_score: d.trust_score,
            verified_capabilities: d.capabilities,
            warnings: d.warnings,
            retry_after: d.retry_after,
            agent_id: d.agent_id,
            audit_index: entry.index,
        })
    }

    /// Reward an agent. With no dimensions, reliability is raised.
    pub fn record_success(&self, agent_id: &str, dims: &[Dimension]) -> TrustScore {
        let score = self.scorer.record_success(agent_id, dims, self.now());
        log::debug!("success for {agent_id}: overall {:.4}", score.overall);
        score
    }

    /// Penalize an agent. With no dimensions, reliability is lowered.
    pub fn record_failure(&self, agent_id: &str, dims: &[Dimension]) -> TrustScore {
        let score = self.scorer.record_failure(agent_id, dims, self.now());
        log::debug!("failure for {agent_id}: overall {:.4}", score.overall);
        score
    }

    pub fn apply_decay(&self, agent_id: &str, elapsed: Duration) -> TrustScore {
        self.scorer.apply_decay(agent_id, elapsed, self.now())
    }

    pub fn get_score(&self, agent_id: &str) -> TrustScore {
        self.scorer.get(agent_id, self.now())
    }

    pub fn all_scores(&self) -> Vec<TrustScore> {
        self.scorer.all()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Forget an agent's rate bucket for one action, or for all actions.
    pub fn reset_rate_limit(&self, agent_id: &str, action: Option<&str>) {
        if let Some(limiter) = &self.limiter {
            limiter.reset(agent_id, action);
        }
    }

    /// Seconds until `(agent_id, action)` passes the rate limit.
    pub fn time_until_available(&self, agent_id: &str, action: &str) -> f64 {
        self.limiter
            .as_ref()
            .map_or(0.0, |l| l.time_until_available(agent_id, action, self.now()))
    }

    pub fn stats(&self) -> GateStats {
        *self.lock_stats()
    }
}
