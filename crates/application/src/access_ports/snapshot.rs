use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use accessledger_core::{AppResult, TenantId};
use accessledger_domain::{DelegationRule, RoleAssignment};

/// Raw grant rows of one subject, read as one consistent batch.
///
/// Delegations are included while flagged active regardless of their window;
/// the resolver evaluates validity against the instant it is asked about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantSnapshot {
    /// Subject the rows belong to.
    pub subject: String,
    /// Active role assignments.
    pub active_assignments: Vec<RoleAssignment>,
    /// Active delegation rules where the subject is the delegate.
    pub incoming_delegations: Vec<DelegationRule>,
}

/// Repository port for consistent grant reads.
#[async_trait]
pub trait GrantSnapshotRepository: Send + Sync {
    /// Loads active assignments and incoming delegations in one read batch.
    async fn load_grant_snapshot(
        &self,
        tenant_id: TenantId,
        subject: &str,
    ) -> AppResult<GrantSnapshot>;
}

/// Optional short-lived cache for grant snapshots.
#[async_trait]
pub trait GrantSnapshotCache: Send + Sync {
    /// Returns a cached snapshot, if present and fresh.
    async fn get_snapshot(
        &self,
        tenant_id: TenantId,
        subject: &str,
    ) -> AppResult<Option<GrantSnapshot>>;

    /// Stores a snapshot for `ttl_seconds`.
    async fn set_snapshot(
        &self,
        tenant_id: TenantId,
        snapshot: &GrantSnapshot,
        ttl_seconds: u32,
    ) -> AppResult<()>;

    /// Drops the cached snapshot of one subject.
    async fn invalidate_subject(&self, tenant_id: TenantId, subject: &str) -> AppResult<()>;
}
