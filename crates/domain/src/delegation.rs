use std::collections::BTreeSet;

use accessledger_core::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::PermissionCode;

/// Closed time window `[starts_at, ends_at]` of a delegation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDelegationWindow", into = "RawDelegationWindow")]
pub struct DelegationWindow {
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawDelegationWindow {
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
}

impl DelegationWindow {
    /// Creates a window, rejecting `starts_at > ends_at`.
    pub fn new(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> AppResult<Self> {
        if starts_at > ends_at {
            return Err(AppError::InvalidRange(format!(
                "delegation starts at '{}' after it ends at '{}'",
                starts_at.to_rfc3339(),
                ends_at.to_rfc3339()
            )));
        }

        Ok(Self { starts_at, ends_at })
    }

    /// Returns the inclusive start.
    #[must_use]
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.starts_at
    }

    /// Returns the inclusive end.
    #[must_use]
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.ends_at
    }

    /// Returns whether `now` lies inside the window, both ends included.
    #[must_use]
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now <= self.ends_at
    }
}

impl TryFrom<RawDelegationWindow> for DelegationWindow {
    type Error = AppError;

    fn try_from(value: RawDelegationWindow) -> Result<Self, Self::Error> {
        Self::new(value.starts_at, value.ends_at)
    }
}

impl From<DelegationWindow> for RawDelegationWindow {
    fn from(value: DelegationWindow) -> Self {
        Self {
            starts_at: value.starts_at,
            ends_at: value.ends_at,
        }
    }
}

/// Which side of a delegation a subject is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationParty {
    /// The subject hands out permissions.
    Delegator,
    /// The subject receives permissions.
    Delegate,
}

impl DelegationParty {
    /// Returns a stable transport value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delegator => "delegator",
            Self::Delegate => "delegate",
        }
    }
}

/// Time-bounded grant of a permission subset from one subject to another.
///
/// Expiry is never written back: a rule past its end keeps `is_active` and
/// simply stops being valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationRule {
    /// Stable delegation identifier.
    pub delegation_id: Uuid,
    /// Subject handing out permissions.
    pub delegator: String,
    /// Subject receiving permissions.
    pub delegate: String,
    /// Delegated permission subset.
    pub permissions: BTreeSet<PermissionCode>,
    /// Validity window.
    pub window: DelegationWindow,
    /// Justification captured at creation.
    pub reason: String,
    /// Cleared by early revocation.
    pub is_active: bool,
    /// Subject that created the rule (the delegator or an administrator).
    pub created_by: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Revocation timestamp, when revoked.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Subject that revoked the rule, when revoked.
    pub revoked_by: Option<String>,
}

impl DelegationRule {
    /// Returns whether the rule grants its permissions at `now`.
    #[must_use]
    pub fn is_currently_valid(&self, now: DateTime<Utc>) -> bool {
        is_currently_valid(self, now)
    }

    /// Returns whether the rule is still flagged active although its window closed.
    #[must_use]
    pub fn is_expired_but_active(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now > self.window.ends_at()
    }

    /// Returns whether `subject` plays `party` in this rule.
    #[must_use]
    pub fn involves(&self, subject: &str, party: DelegationParty) -> bool {
        match party {
            DelegationParty::Delegator => self.delegator == subject,
            DelegationParty::Delegate => self.delegate == subject,
        }
    }

    /// Deactivates the rule. Returns `false` when it was already inactive.
    pub fn revoke(&mut self, revoked_by: impl Into<String>, revoked_at: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }

        self.is_active = false;
        self.revoked_by = Some(revoked_by.into());
        self.revoked_at = Some(revoked_at);
        true
    }
}

/// `rule.is_active && rule.start <= now <= rule.end`.
#[must_use]
pub fn is_currently_valid(rule: &DelegationRule, now: DateTime<Utc>) -> bool {
    rule.is_active && rule.window.contains(now)
}
