use super::*;

impl PostgresChecklistRepository {
    pub(super) async fn insert_missing_checks_impl(
        &self,
        tenant_id: TenantId,
        system_id: &str,
        checks: Vec<ValidationCheck>,
    ) -> AppResult<InsertChecksOutcome> {
        let requested = u32::try_from(checks.len()).map_err(|_| {
            AppError::Validation(format!("too many checks requested for system '{system_id}'"))
        })?;

        let mut category_ids = Vec::with_capacity(checks.len());
        let mut check_ids = Vec::with_capacity(checks.len());
        let mut statuses = Vec::with_capacity(checks.len());
        for check in checks {
            category_ids.push(check.category_id);
            check_ids.push(check.check_id);
            statuses.push(check.status.as_str().to_owned());
        }

        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin transaction: {error}"))
        })?;

        let created_summary = sqlx::query_scalar::<_, String>(
            r#"
            INSERT INTO validation_summaries (tenant_id, system_id)
            VALUES ($1, $2)
            ON CONFLICT (tenant_id, system_id) DO NOTHING
            RETURNING system_id
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(system_id)
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to create validation summary: {error}"))
        })?
        .is_some();

        let stored = lock_summary(&mut transaction, tenant_id, system_id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "validation summary of system '{system_id}' vanished during initialization"
                ))
            })?;

        let created_statuses = sqlx::query_scalar::<_, String>(
            r#"
            INSERT INTO validation_checks (
                tenant_id,
                system_id,
                category_id,
                check_id,
                is_checked,
                status
            )
            SELECT $1, $2, input.category_id, input.check_id, false, input.status
            FROM UNNEST($3::TEXT[], $4::TEXT[], $5::TEXT[])
                AS input(category_id, check_id, status)
            ON CONFLICT (tenant_id, system_id, check_id) DO NOTHING
            RETURNING status
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(system_id)
        .bind(category_ids)
        .bind(check_ids)
        .bind(statuses)
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to insert validation checks: {error}")))?;

        let created = u32::try_from(created_statuses.len()).map_err(|_| {
            AppError::Internal(format!("too many checks created for system '{system_id}'"))
        })?;

        let summary = if created_summary {
            scan_summary(&mut transaction, tenant_id, system_id).await?
        } else {
            let created_applicable = created_statuses
                .iter()
                .filter(|status| status.as_str() != CheckStatus::NotApplicable.as_str())
                .count();
            let created_applicable = u32::try_from(created_applicable).map_err(|_| {
                AppError::Internal(format!("too many checks created for system '{system_id}'"))
            })?;

            ValidationSummary {
                last_validated_at: stored.last_validated_at,
                last_validated_by: stored.last_validated_by.clone(),
                ..ValidationSummary::new(
                    system_id,
                    stored.total_checks.saturating_add(created_applicable),
                    stored.completed_checks,
                )
            }
        };
        write_summary(&mut transaction, tenant_id, &summary).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(InsertChecksOutcome {
            created,
            existing: requested.saturating_sub(created),
        })
    }
}
