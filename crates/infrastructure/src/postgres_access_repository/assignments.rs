use super::*;

impl PostgresAccessRepository {
    pub(super) async fn insert_active_assignment_impl(
        &self,
        tenant_id: TenantId,
        assignment: RoleAssignment,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO role_assignments (
                id,
                tenant_id,
                subject,
                role_id,
                is_active,
                assigned_at,
                assigned_by
            )
            VALUES ($1, $2, $3, $4, true, $5, $6)
            "#,
        )
        .bind(assignment.assignment_id)
        .bind(tenant_id.as_uuid())
        .bind(assignment.subject.as_str())
        .bind(assignment.role_id.as_str())
        .bind(assignment.assigned_at)
        .bind(assignment.assigned_by.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if let sqlx::Error::Database(database_error) = &error
                && database_error.code().as_deref() == Some("23505")
            {
                return AppError::Conflict(format!(
                    "subject '{}' already holds role '{}'",
                    assignment.subject, assignment.role_id
                ));
            }

            AppError::Internal(format!("failed to insert role assignment: {error}"))
        })?;

        Ok(())
    }

    pub(super) async fn deactivate_assignment_impl(
        &self,
        tenant_id: TenantId,
        subject: &str,
        role_id: &RoleId,
        revoked_by: &str,
        revoked_at: DateTime<Utc>,
    ) -> AppResult<RoleAssignment> {
        let row = sqlx::query_as::<_, RoleAssignmentRow>(
            r#"
            UPDATE role_assignments
            SET is_active = false,
                revoked_at = $4,
                revoked_by = $5
            WHERE tenant_id = $1
              AND subject = $2
              AND role_id = $3
              AND is_active
            RETURNING
                id,
                subject,
                role_id,
                is_active,
                assigned_at,
                assigned_by,
                revoked_at,
                revoked_by
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(subject)
        .bind(role_id.as_str())
        .bind(revoked_at)
        .bind(revoked_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to revoke role assignment: {error}")))?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "subject '{subject}' has no active assignment of role '{role_id}'"
            ))
        })?;

        RoleAssignment::try_from(row)
    }

    pub(super) async fn list_active_assignments_impl(
        &self,
        tenant_id: TenantId,
        subject: &str,
    ) -> AppResult<Vec<RoleAssignment>> {
        let rows = sqlx::query_as::<_, RoleAssignmentRow>(
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
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list active role assignments: {error}"))
        })?;

        map_assignments(rows)
    }

    pub(super) async fn list_assignments_impl(
        &self,
        tenant_id: TenantId,
        query: RoleAssignmentQuery,
    ) -> AppResult<Vec<RoleAssignment>> {
        let limit = i64::try_from(query.limit).map_err(|_| {
            AppError::Validation("role assignment query limit is too large".to_owned())
        })?;
        let offset = i64::try_from(query.offset).map_err(|_| {
            AppError::Validation("role assignment query offset is too large".to_owned())
        })?;

        let rows = sqlx::query_as::<_, RoleAssignmentRow>(
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
              AND ($2::TEXT IS NULL OR subject = $2)
              AND ($3 OR is_active)
            ORDER BY assigned_at DESC, id
            LIMIT $4
            OFFSET $5
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(query.subject.as_deref())
        .bind(query.include_inactive)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list role assignments: {error}")))?;

        map_assignments(rows)
    }
}
