use super::*;

impl PostgresAccessRepository {
    /// Reads assignments and incoming delegations inside one read-only
    /// repeatable-read transaction so both see the same snapshot.
    pub(super) async fn load_grant_snapshot_impl(
        &self,
        tenant_id: TenantId,
        subject: &str,
    ) -> AppResult<GrantSnapshot> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin grant snapshot transaction: {error}"))
        })?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to set grant snapshot isolation: {error}"))
            })?;

        let assignment_rows = sqlx::query_as::<_, RoleAssignmentRow>(
            r#"
            SELECT
                id,
                subject,
                role_id,
                is_active,
                assigned_at,
                assigned_by,
                revoked_at,
                revoked_by
            FROM role_assignments
            WHERE tenant_id = $1
              AND subject = $2
              AND is_active
            ORDER BY role_id
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(subject)
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load role assignments for snapshot: {error}"))
        })?;

        let delegation_rows = sqlx::query_as::<_, DelegationRuleRow>(
            r#"
            SELECT
                id,
                tenant_id,
                delegator,
                delegate,
                permissions,
                starts_at,
                ends_at,
                reason,
                is_active,
                created_by,
                created_at,
                revoked_at,
                revoked_by
            FROM delegation_rules
            WHERE tenant_id = $1
              AND delegate = $2
              AND is_active
            ORDER BY created_at, id
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(subject)
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load delegations for snapshot: {error}"))
        })?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to close grant snapshot transaction: {error}"))
        })?;

        Ok(GrantSnapshot {
            subject: subject.to_owned(),
            active_assignments: map_assignments(assignment_rows)?,
            incoming_delegations: map_rules(delegation_rows)?,
        })
    }
}
