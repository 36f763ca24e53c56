//! On-behalf-of context: the end user an agent is acting for.
//!
//! Propagated alongside a card but not covered by its signature.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capability;
use crate::time::{duration_to_micros, now_micros};

/// The end-user principal behind a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    pub issued_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self::new_at(user_id, now_micros())
    }

    pub fn new_at(user_id: impl Into<String>, now: u64) -> Self {
        Self {
            user_id: user_id.into(),
            user_email: None,
            roles: BTreeSet::new(),
            permissions: BTreeSet::new(),
            issued_at: now,
            expires_at: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.user_email = Some(email.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    /// Expire `ttl` after the issue time.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at = Some(self.issued_at.saturating_add(duration_to_micros(ttl)));
        self
    }

    pub fn is_valid_at(&self, now: u64) -> bool {
        self.expires_at.map_or(true, |exp| now < exp)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_micros())
    }

    /// Wildcard-aware permission check.
    pub fn has_permission(&self, permission: &str) -> bool {
        capability::set_covers(&self.permissions, permission)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}
