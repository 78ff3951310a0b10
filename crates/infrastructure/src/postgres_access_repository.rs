mod assignments;
mod delegations;
mod snapshot;

#[cfg(test)]
mod tests;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use accessledger_application::{
    DelegationRepository, DelegationRevocation, GrantSnapshot, GrantSnapshotRepository,
    RoleAssignmentQuery, RoleAssignmentRepository, TenantDelegation,
};
use accessledger_core::{AppError, AppResult, TenantId};
use accessledger_domain::{
    DelegationParty, DelegationRule, DelegationWindow, PermissionCode, RoleAssignment, RoleId,
};

/// PostgreSQL-backed store for role assignments and the delegation ledger.
#[derive(Clone)]
pub struct PostgresAccessRepository {
    pool: PgPool,
}

impl PostgresAccessRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RoleAssignmentRow {
    id: Uuid,
    subject: String,
    role_id: String,
    is_active: bool,
    assigned_at: DateTime<Utc>,
    assigned_by: String,
    revoked_at: Option<DateTime<Utc>>,
    revoked_by: Option<String>,
}

impl TryFrom<RoleAssignmentRow> for RoleAssignment {
    type Error = AppError;

    fn try_from(row: RoleAssignmentRow) -> Result<Self, Self::Error> {
        let role_id = RoleId::new(row.role_id).map_err(|error| {
            AppError::Internal(format!(
                "persisted role assignment '{}' has an invalid role id: {error}",
                row.id
            ))
        })?;

        Ok(Self {
            assignment_id: row.id,
            subject: row.subject,
            role_id,
            is_active: row.is_active,
            assigned_at: row.assigned_at,
            assigned_by: row.assigned_by,
            revoked_at: row.revoked_at,
            revoked_by: row.revoked_by,
        })
    }
}

#[derive(Debug, FromRow)]
struct DelegationRuleRow {
    id: Uuid,
    tenant_id: Uuid,
    delegator: String,
    delegate: String,
    permissions: Vec<String>,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    reason: String,
    is_active: bool,
    created_by: String,
    created_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    revoked_by: Option<String>,
}

impl TryFrom<DelegationRuleRow> for DelegationRule {
    type Error = AppError;

    fn try_from(row: DelegationRuleRow) -> Result<Self, Self::Error> {
        let permissions = row
            .permissions
            .into_iter()
            .map(PermissionCode::new)
            .collect::<AppResult<BTreeSet<_>>>()
            .map_err(|error| {
                AppError::Internal(format!(
                    "persisted delegation '{}' has an invalid permission code: {error}",
                    row.id
                ))
            })?;
        let window = DelegationWindow::new(row.starts_at, row.ends_at).map_err(|error| {
            AppError::Internal(format!(
                "persisted delegation '{}' has an invalid window: {error}",
                row.id
            ))
        })?;

        Ok(Self {
            delegation_id: row.id,
            delegator: row.delegator,
            delegate: row.delegate,
            permissions,
            window,
            reason: row.reason,
            is_active: row.is_active,
            created_by: row.created_by,
            created_at: row.created_at,
            revoked_at: row.revoked_at,
            revoked_by: row.revoked_by,
        })
    }
}

fn map_rules(rows: Vec<DelegationRuleRow>) -> AppResult<Vec<DelegationRule>> {
    rows.into_iter().map(DelegationRule::try_from).collect()
}

fn map_assignments(rows: Vec<RoleAssignmentRow>) -> AppResult<Vec<RoleAssignment>> {
    rows.into_iter().map(RoleAssignment::try_from).collect()
}

#[async_trait]
impl RoleAssignmentRepository for PostgresAccessRepository {
    async fn insert_active_assignment(
        &self,
        tenant_id: TenantId,
        assignment: RoleAssignment,
    ) -> AppResult<()> {
        self.insert_active_assignment_impl(tenant_id, assignment)
            .await
    }

    async fn deactivate_assignment(
        &self,
        tenant_id: TenantId,
        subject: &str,
        role_id: &RoleId,
        revoked_by: &str,
        revoked_at: DateTime<Utc>,
    ) -> AppResult<RoleAssignment> {
        self.deactivate_assignment_impl(tenant_id, subject, role_id, revoked_by, revoked_at)
            .await
    }

    async fn list_active_assignments(
        &self,
        tenant_id: TenantId,
        subject: &str,
    ) -> AppResult<Vec<RoleAssignment>> {
        self.list_active_assignments_impl(tenant_id, subject).await
    }

    async fn list_assignments(
        &self,
        tenant_id: TenantId,
        query: RoleAssignmentQuery,
    ) -> AppResult<Vec<RoleAssignment>> {
        self.list_assignments_impl(tenant_id, query).await
    }
}

#[async_trait]
impl DelegationRepository for PostgresAccessRepository {
    async fn insert_delegation(&self, tenant_id: TenantId, rule: DelegationRule) -> AppResult<()> {
        self.insert_delegation_impl(tenant_id, rule).await
    }

    async fn find_delegation(
        &self,
        tenant_id: TenantId,
        delegation_id: Uuid,
    ) -> AppResult<Option<DelegationRule>> {
        self.find_delegation_impl(tenant_id, delegation_id).await
    }

    async fn revoke_delegation(
        &self,
        tenant_id: TenantId,
        delegation_id: Uuid,
        revoked_by: &str,
        revoked_at: DateTime<Utc>,
    ) -> AppResult<DelegationRevocation> {
        self.revoke_delegation_impl(tenant_id, delegation_id, revoked_by, revoked_at)
            .await
    }

    async fn list_delegations_for(
        &self,
        tenant_id: TenantId,
        subject: &str,
        party: DelegationParty,
    ) -> AppResult<Vec<DelegationRule>> {
        self.list_delegations_for_impl(tenant_id, subject, party)
            .await
    }

    async fn list_expired_active_delegations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<TenantDelegation>> {
        self.list_expired_active_delegations_impl(now, limit).await
    }
}

#[async_trait]
impl GrantSnapshotRepository for PostgresAccessRepository {
    async fn load_grant_snapshot(
        &self,
        tenant_id: TenantId,
        subject: &str,
    ) -> AppResult<GrantSnapshot> {
        self.load_grant_snapshot_impl(tenant_id, subject).await
    }
}
