use super::*;

impl PostgresChecklistRepository {
    pub(super) async fn count_checks_impl(
        &self,
        tenant_id: TenantId,
        system_id: &str,
    ) -> AppResult<u32> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM validation_checks
            WHERE tenant_id = $1 AND system_id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(system_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to count validation checks: {error}")))?;

        u32::try_from(count)
            .map_err(|_| AppError::Internal(format!("system '{system_id}' has too many checks")))
    }

    pub(super) async fn delete_system_impl(
        &self,
        tenant_id: TenantId,
        system_id: &str,
    ) -> AppResult<ResetSystemOutcome> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin transaction: {error}"))
        })?;

        let deleted_checks = sqlx::query(
            r#"
            DELETE FROM validation_checks
            WHERE tenant_id = $1 AND system_id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(system_id)
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to delete validation checks: {error}")))?
        .rows_affected();

        let summary_deleted = sqlx::query(
            r#"
            DELETE FROM validation_summaries
            WHERE tenant_id = $1 AND system_id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(system_id)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to delete validation summary: {error}"))
        })?
        .rows_affected()
            > 0;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(ResetSystemOutcome {
            deleted_checks,
            summary_deleted,
        })
    }

    pub(super) async fn find_summary_impl(
        &self,
        tenant_id: TenantId,
        system_id: &str,
    ) -> AppResult<Option<ValidationSummary>> {
        let row = sqlx::query_as::<_, ValidationSummaryRow>(
            r#"
            SELECT
                system_id,
                total_checks,
                completed_checks,
                status,
                last_validated_at,
                last_validated_by
            FROM validation_summaries
            WHERE tenant_id = $1 AND system_id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(system_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find validation summary: {error}")))?;

        row.map(ValidationSummary::try_from).transpose()
    }

    pub(super) async fn list_checks_impl(
        &self,
        tenant_id: TenantId,
        system_id: &str,
    ) -> AppResult<Vec<ValidationCheck>> {
        let rows = sqlx::query_as::<_, ValidationCheckRow>(
            r#"
            SELECT
                system_id,
                category_id,
                check_id,
                is_checked,
                status,
                checked_by,
                checked_at
            FROM validation_checks
            WHERE tenant_id = $1 AND system_id = $2
            ORDER BY category_id, check_id
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(system_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list validation checks: {error}")))?;

        rows.into_iter().map(ValidationCheck::try_from).collect()
    }

    pub(super) async fn reconcile_summary_impl(
        &self,
        tenant_id: TenantId,
        system_id: &str,
        repair: bool,
    ) -> AppResult<Option<SummaryReconciliation>> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin transaction: {error}"))
        })?;

        let Some(stored) = lock_summary(&mut transaction, tenant_id, system_id).await? else {
            return Ok(None);
        };

        let scanned = scan_summary(&mut transaction, tenant_id, system_id).await?;
        let observed = ValidationSummary {
            last_validated_at: stored.last_validated_at,
            last_validated_by: stored.last_validated_by.clone(),
            ..scanned
        };

        let repaired = repair && !stored.counters_match(&observed);
        if repaired {
            write_summary(&mut transaction, tenant_id, &observed).await?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(Some(SummaryReconciliation {
            stored,
            observed,
            repaired,
        }))
    }

    pub(super) async fn list_systems_impl(&self) -> AppResult<Vec<ChecklistSystemKey>> {
        let rows = sqlx::query_as::<_, (uuid::Uuid, String)>(
            r#"
            SELECT tenant_id, system_id
            FROM validation_summaries
            ORDER BY tenant_id, system_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list validation systems: {error}")))?;

        Ok(rows
            .into_iter()
            .map(|(tenant_id, system_id)| ChecklistSystemKey {
                tenant_id: TenantId::from_uuid(tenant_id),
                system_id,
            })
            .collect())
    }
}
