use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use accessledger_core::{AppResult, TenantId};
use accessledger_domain::{DelegationParty, DelegationRule};

/// Input payload for creating a delegation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDelegationInput {
    /// Subject handing out permissions.
    pub delegator: String,
    /// Subject receiving permissions.
    pub delegate: String,
    /// Raw permission codes to delegate.
    pub permissions: Vec<String>,
    /// Inclusive window start.
    pub starts_at: DateTime<Utc>,
    /// Inclusive window end.
    pub ends_at: DateTime<Utc>,
    /// Justification for the delegation.
    pub reason: String,
}

/// Result of a revocation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegationRevocation {
    /// The rule was active and is now revoked.
    Revoked(DelegationRule),
    /// The rule was already inactive; nothing changed.
    AlreadyInactive(DelegationRule),
}

impl DelegationRevocation {
    /// Returns the rule in its current persisted state.
    #[must_use]
    pub fn rule(&self) -> &DelegationRule {
        match self {
            Self::Revoked(rule) | Self::AlreadyInactive(rule) => rule,
        }
    }

    /// Returns whether this call changed state.
    #[must_use]
    pub fn changed(&self) -> bool {
        matches!(self, Self::Revoked(_))
    }
}

/// Delegation rule tagged with its tenant, for cross-tenant housekeeping reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantDelegation {
    /// Tenant owning the rule.
    pub tenant_id: TenantId,
    /// Delegation rule.
    pub rule: DelegationRule,
}

/// Repository port for the delegation ledger.
#[async_trait]
pub trait DelegationRepository: Send + Sync {
    /// Persists a new rule as one atomic row write.
    async fn insert_delegation(&self, tenant_id: TenantId, rule: DelegationRule) -> AppResult<()>;

    /// Finds one rule.
    async fn find_delegation(
        &self,
        tenant_id: TenantId,
        delegation_id: Uuid,
    ) -> AppResult<Option<DelegationRule>>;

    /// Deactivates one rule. Already inactive rules are reported, not rejected.
    ///
    /// Fails with `AppError::NotFound` when the rule does not exist.
    async fn revoke_delegation(
        &self,
        tenant_id: TenantId,
        delegation_id: Uuid,
        revoked_by: &str,
        revoked_at: DateTime<Utc>,
    ) -> AppResult<DelegationRevocation>;

    /// Lists rules where the subject plays `party`, most recent first.
    async fn list_delegations_for(
        &self,
        tenant_id: TenantId,
        subject: &str,
        party: DelegationParty,
    ) -> AppResult<Vec<DelegationRule>>;

    /// Lists rules still flagged active whose window closed before `now`.
    async fn list_expired_active_delegations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<TenantDelegation>>;
}
