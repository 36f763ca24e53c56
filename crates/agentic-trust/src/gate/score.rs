//! Dynamic, multi-dimensional trust scores.
//!
//! `overall` is a fixed weighted sum of five dimensions, each kept in
//! `[0, 1]`. Outcomes nudge individual dimensions; decay pulls all of them
//! toward zero in proportion to elapsed time.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrustError};

use super::policy::ScoringConfig;

/// Weights of (reliability, capability, security, compliance, history).
pub const DIMENSION_WEIGHTS: [f64; 5] = [0.25, 0.20, 0.25, 0.20, 0.10];

/// A named trust dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Reliability,
    Capability,
    Security,
    Compliance,
    History,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Reliability,
        Dimension::Capability,
        Dimension::Security,
        Dimension::Compliance,
        Dimension::History,
    ];
}

impl FromStr for Dimension {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "reliability" => Ok(Self::Reliability),
            "capability" => Ok(Self::Capability),
            "security" => Ok(Self::Security),
            "compliance" => Ok(Self::Compliance),
            "history" => Ok(Self::History),
            other => Err(TrustError::InvalidConfig(format!(
                "unknown trust dimension: {other}"
            ))),
        }
    }
}

/// Per-agent score record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustScore {
    pub agent_id: String,
    pub overall: f64,
    pub reliability: f64,
    pub capability: f64,
    pub security: f64,
    pub compliance: f64,
    pub history: f64,
    pub successes: u64,
    pub failures: u64,
    pub last_updated: u64,
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

impl TrustScore {
    pub fn new(agent_id: impl Into<String>, default_score: f64, now: u64) -> Self {
        let d = default_score.clamp(0.0, 1.0);
        let mut score = Self {
            agent_id: agent_id.into(),
            overall: d,
            reliability: d,
            capability: d,
            security: d,
            compliance: d,
            history: d,
            successes: 0,
            failures: 0,
            last_updated: now,
        };
        score.recompute();
        score
    }

    pub fn dimension(&self, dim: Dimension) -> f64 {
        match dim {
            Dimension::Reliability => self.reliability,
            Dimension::Capability => self.capability,
            Dimension::Security => self.security,
            Dimension::Compliance => self.compliance,
            Dimension::History => self.history,
        }
    }

    fn dimension_mut(&mut self, dim: Dimension) -> &mut f64 {
        match dim {
            Dimension::Reliability => &mut self.reliability,
            Dimension::Capability => &mut self.capability,
            Dimension::Security => &mut self.security,
            Dimension::Compliance => &mut self.compliance,
            Dimension::History => &mut self.history,
        }
    }

    fn recompute(&mut self) {
        let sum: f64 = Dimension::ALL
            .iter()
            .zip(DIMENSION_WEIGHTS)
            .map(|(d, w)| self.dimension(*d) * w)
            .sum();
        self.overall = round4(sum).clamp(0.0, 1.0);
    }

    fn adjust(&mut self, dims: &[Dimension], delta: f64) {
        let dims = if dims.is_empty() {
            &[Dimension::Reliability][..]
        } else {
            dims
        };
        for dim in dims {
            let v = self.dimension_mut(*dim);
            *v = round4((*v + delta).clamp(0.0, 1.0));
        }
        self.recompute();
    }

    /// Raise the given dimensions (reliability when none) by `reward`.
    pub fn record_success(&mut self, dims: &[Dimension], reward: f64, now: u64) {
        self.adjust(dims, reward.abs());
        self.successes += 1;
        self.last_updated = now;
    }

    /// Lower the given dimensions (reliability when none) by `penalty`.
    pub fn record_failure(&mut self, dims: &[Dimension], penalty: f64, now: u64) {
        self.adjust(dims, -penalty.abs());
        self.failures += 1;
        self.last_updated = now;
    }

    /// Subtract `per_hour * hours(elapsed)` from every dimension.
    pub fn apply_decay(&mut self, elapsed: Duration, per_hour: f64, now: u64) {
        let amount = per_hour * elapsed.as_secs_f64() / 3600.0;
        if amount > 0.0 {
            for dim in Dimension::ALL {
                let v = self.dimension_mut(dim);
                *v = round4((*v - amount).max(0.0));
            }
            self.recompute();
        }
        self.last_updated = now;
    }
}

/// The gate's score map. One lock covers every record so that
/// adjustments and reads observe a consistent value.
#[derive(Debug)]
pub struct TrustScorer {
    config: ScoringConfig,
    scores: Mutex<HashMap<String, TrustScore>>,
}

impl TrustScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            config,
            scores: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TrustScore>> {
        self.scores.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_record<R>(&self, agent_id: &str, now: u64, f: impl FnOnce(&mut TrustScore) -> R) -> R {
        let mut scores = self.lock();
        let record = scores
            .entry(agent_id.to_string())
            .or_insert_with(|| TrustScore::new(agent_id, self.config.default_score, now));
        f(record)
    }

    /// Current record, created at the default score on first lookup.
    pub fn get(&self, agent_id: &str, now: u64) -> TrustScore {
        self.with_record(agent_id, now, |r| r.clone())
    }

    pub fn record_success(&self, agent_id: &str, dims: &[Dimension], now: u64) -> TrustScore {
        let reward = self.config.reward;
        self.with_record(agent_id, now, |r| {
            r.record_success(dims, reward, now);
            r.clone()
        })
    }

    pub fn record_failure(&self, agent_id: &str, dims: &[Dimension], now: u64) -> TrustScore {
        let penalty = self.config.penalty;
        self.with_record(agent_id, now, |r| {
            r.record_failure(dims, penalty, now);
            r.clone()
        })
    }

    pub fn apply_decay(&self, agent_id: &str, elapsed: Duration, now: u64) -> TrustScore {
        let rate = self.config.decay_per_hour;
        self.with_record(agent_id, now, |r| {
            r.apply_decay(elapsed, rate, now);
            r.clone()
        })
    }

    /// All records, sorted by agent id.
    pub fn all(&self) -> Vec<TrustScore> {
        let mut out: Vec<_> = self.lock().values().cloned().collect();
        out.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        out
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
