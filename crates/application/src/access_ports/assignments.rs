use async_trait::async_trait;
use chrono::{DateTime, Utc};

use accessledger_core::{AppResult, TenantId};
use accessledger_domain::{RoleAssignment, RoleId};

/// Query parameters for assignment listings on audit dashboards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignmentQuery {
    /// Optional subject filter.
    pub subject: Option<String>,
    /// Whether revoked assignments are included.
    pub include_inactive: bool,
    /// Maximum rows returned.
    pub limit: usize,
    /// Number of rows skipped for pagination.
    pub offset: usize,
}

/// Repository port for functional role assignments.
#[async_trait]
pub trait RoleAssignmentRepository: Send + Sync {
    /// Persists a new active assignment.
    ///
    /// Fails with `AppError::Conflict` when the subject already holds an
    /// active assignment of the same role.
    async fn insert_active_assignment(
        &self,
        tenant_id: TenantId,
        assignment: RoleAssignment,
    ) -> AppResult<()>;

    /// Deactivates the active assignment of a role and returns it.
    ///
    /// Fails with `AppError::NotFound` when no active assignment exists.
    async fn deactivate_assignment(
        &self,
        tenant_id: TenantId,
        subject: &str,
        role_id: &RoleId,
        revoked_by: &str,
        revoked_at: DateTime<Utc>,
    ) -> AppResult<RoleAssignment>;

    /// Lists active assignments of one subject.
    async fn list_active_assignments(
        &self,
        tenant_id: TenantId,
        subject: &str,
    ) -> AppResult<Vec<RoleAssignment>>;

    /// Lists assignments for reporting, newest first.
    async fn list_assignments(
        &self,
        tenant_id: TenantId,
        query: RoleAssignmentQuery,
    ) -> AppResult<Vec<RoleAssignment>>;
}
