use super::*;

impl PostgresAccessRepository {
    pub(super) async fn insert_delegation_impl(
        &self,
        tenant_id: TenantId,
        rule: DelegationRule,
    ) -> AppResult<()> {
        let permissions: Vec<String> = rule
            .permissions
            .iter()
            .map(|code| code.as_str().to_owned())
            .collect();

        sqlx::query(
            r#"
            INSERT INTO delegation_rules (
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
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(rule.delegation_id)
        .bind(tenant_id.as_uuid())
        .bind(rule.delegator.as_str())
        .bind(rule.delegate.as_str())
        .bind(permissions)
        .bind(rule.window.starts_at())
        .bind(rule.window.ends_at())
        .bind(rule.reason.as_str())
        .bind(rule.is_active)
        .bind(rule.created_by.as_str())
        .bind(rule.created_at)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to insert delegation: {error}")))?;

        Ok(())
    }

    pub(super) async fn find_delegation_impl(
        &self,
        tenant_id: TenantId,
        delegation_id: Uuid,
    ) -> AppResult<Option<DelegationRule>> {
        let row = sqlx::query_as::<_, DelegationRuleRow>(
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
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(delegation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find delegation: {error}")))?;

        row.map(DelegationRule::try_from).transpose()
    }

    pub(super) async fn revoke_delegation_impl(
        &self,
        tenant_id: TenantId,
        delegation_id: Uuid,
        revoked_by: &str,
        revoked_at: DateTime<Utc>,
    ) -> AppResult<DelegationRevocation> {
        let revoked = sqlx::query_as::<_, DelegationRuleRow>(
            r#"
            UPDATE delegation_rules
            SET is_active = false,
                revoked_at = $3,
                revoked_by = $4
            WHERE tenant_id = $1
              AND id = $2
              AND is_active
            RETURNING
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
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(delegation_id)
        .bind(revoked_at)
        .bind(revoked_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to revoke delegation: {error}")))?;

        if let Some(row) = revoked {
            return DelegationRule::try_from(row).map(DelegationRevocation::Revoked);
        }

        self.find_delegation_impl(tenant_id, delegation_id)
            .await?
            .map(DelegationRevocation::AlreadyInactive)
            .ok_or_else(|| {
                AppError::NotFound(format!("delegation '{delegation_id}' was not found"))
            })
    }

    pub(super) async fn list_delegations_for_impl(
        &self,
        tenant_id: TenantId,
        subject: &str,
        party: DelegationParty,
    ) -> AppResult<Vec<DelegationRule>> {
        let rows = sqlx::query_as::<_, DelegationRuleRow>(
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
              AND CASE $3
                    WHEN 'delegator' THEN delegator = $2
                    ELSE delegate = $2
                  END
            ORDER BY created_at DESC, id
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(subject)
        .bind(party.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list delegations: {error}")))?;

        map_rules(rows)
    }

    pub(super) async fn list_expired_active_delegations_impl(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<TenantDelegation>> {
        let limit = i64::try_from(limit).map_err(|_| {
            AppError::Validation("expired delegation report limit is too large".to_owned())
        })?;

        let rows = sqlx::query_as::<_, DelegationRuleRow>(
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
            WHERE is_active
              AND ends_at < $1
            ORDER BY ends_at, id
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list expired active delegations: {error}"))
        })?;

        rows.into_iter()
            .map(|row| {
                let tenant_id = TenantId::from_uuid(row.tenant_id);
                DelegationRule::try_from(row).map(|rule| TenantDelegation { tenant_id, rule })
            })
            .collect()
    }
}
