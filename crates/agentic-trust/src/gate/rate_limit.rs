//! Token bucket rate limiting per `(agent_id, action)`.
//!
//! Buckets start full with `max_requests` tokens and refill continuously at
//! `max_requests / window_secs` tokens per second. Refill happens lazily on
//! each call; there is no background timer.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::Result;
use crate::time::MICROS_PER_SEC;

use super::policy::RateLimitConfig;

/// A single bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    /// Tokens added per second.
    refill_rate: f64,
    last_refill: u64,
}

impl TokenBucket {
    pub fn new(config: &RateLimitConfig, now: u64) -> Self {
        let capacity = f64::from(config.max_requests);
        Self {
            capacity,
            tokens: capacity,
            refill_rate: capacity / config.window_secs,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: u64) {
        if now > self.last_refill {
            let elapsed = (now - self.last_refill) as f64 / MICROS_PER_SEC as f64;
            self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Take one token if available.
    pub fn try_consume(&mut self, now: u64) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Seconds until one token is available; 0 when one already is.
    pub fn time_until_available(&mut self, now: u64) -> f64 {
        self.refill(now);
        if self.tokens >= 1.0 {
            0.0
        } else {
            (1.0 - self.tokens) / self.refill_rate
        }
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }
}

/// Outcome of [`RateLimiter::consume`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: f64 },
}

type BucketKey = (String, String);

/// Keyed buckets guarded by one lock.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<BucketKey, TokenBucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<BucketKey, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn consume(&self, agent_id: &str, action: &str, now: u64) -> RateDecision {
        let mut buckets = self.lock();
        let bucket = buckets
            .entry((agent_id.to_string(), action.to_string()))
            .or_insert_with(|| TokenBucket::new(&self.config, now));

        if bucket.try_consume(now) {
            RateDecision::Allowed {
                remaining: bucket.tokens().floor() as u32,
            }
        } else {
            RateDecision::Limited {
                retry_after_secs: bucket.time_until_available(now),
            }
        }
    }

    /// Seconds until `(agent_id, action)` may proceed. Unknown keys are
    /// available immediately.
    pub fn time_until_available(&self, agent_id: &str, action: &str, now: u64) -> f64 {
        self.lock()
            .get_mut(&(agent_id.to_string(), action.to_string()))
            .map_or(0.0, |b| b.time_until_available(now))
    }

    /// Drop one agent's bucket for `action`, or all of its buckets.
    pub fn reset(&self, agent_id: &str, action: Option<&str>) {
        let mut buckets = self.lock();
        match action {
            Some(action) => {
                buckets.remove(&(agent_id.to_string(), action.to_string()));
            }
            None => buckets.retain(|(agent, _), _| agent != agent_id),
        }
    }
}
