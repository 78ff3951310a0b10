use accessledger_application::{CheckWriteOutcome, CheckWriteResult};
use accessledger_domain::{CheckUpdatePlan, SummaryDelta};
use sqlx::Connection;

use super::*;

struct RowWrite {
    outcome: CheckWriteOutcome,
    check: Option<ValidationCheck>,
    delta: SummaryDelta,
}

impl PostgresChecklistRepository {
    pub(super) async fn apply_check_updates_impl(
        &self,
        tenant_id: TenantId,
        system_id: &str,
        updates: Vec<CheckUpdate>,
        actor: &str,
        at: DateTime<Utc>,
    ) -> AppResult<AppliedCheckUpdates> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin transaction: {error}"))
        })?;

        let mut summary = lock_summary(&mut transaction, tenant_id, system_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("validation system '{system_id}' is not initialized"))
            })?;

        let mut results = Vec::with_capacity(updates.len());
        let mut applied_delta = SummaryDelta::default();

        for update in updates {
            // Each row runs in its own savepoint so one failed write leaves
            // the rest of the batch intact.
            let mut savepoint = Connection::begin(&mut *transaction).await.map_err(|error| {
                AppError::Internal(format!("failed to open savepoint: {error}"))
            })?;

            let written = write_row(&mut savepoint, tenant_id, system_id, &update, actor, at).await;
            let row_write = match written {
                Ok(row_write) => {
                    savepoint.commit().await.map_err(|error| {
                        AppError::Internal(format!("failed to release savepoint: {error}"))
                    })?;
                    row_write
                }
                Err(error) => {
                    savepoint.rollback().await.map_err(|rollback_error| {
                        AppError::Internal(format!(
                            "failed to roll back savepoint: {rollback_error}"
                        ))
                    })?;
                    RowWrite {
                        outcome: CheckWriteOutcome::Failed {
                            message: error.to_string(),
                        },
                        check: None,
                        delta: SummaryDelta::default(),
                    }
                }
            };

            applied_delta += row_write.delta;
            results.push(CheckWriteResult {
                check_id: update.check_id,
                outcome: row_write.outcome,
                check: row_write.check,
            });
        }

        if !applied_delta.is_zero() {
            summary.apply_delta(applied_delta, actor, at);
            write_summary(&mut transaction, tenant_id, &summary).await?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(AppliedCheckUpdates {
            results,
            applied_delta,
            summary,
        })
    }
}

async fn write_row(
    connection: &mut PgConnection,
    tenant_id: TenantId,
    system_id: &str,
    update: &CheckUpdate,
    actor: &str,
    at: DateTime<Utc>,
) -> AppResult<RowWrite> {
    let row = sqlx::query_as::<_, ValidationCheckRow>(
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
        WHERE tenant_id = $1 AND system_id = $2 AND check_id = $3
        FOR UPDATE
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(system_id)
    .bind(update.check_id.as_str())
    .fetch_optional(&mut *connection)
    .await
    .map_err(|error| AppError::Internal(format!("failed to read validation check: {error}")))?;

    let Some(row) = row else {
        return Ok(RowWrite {
            outcome: CheckWriteOutcome::Missing,
            check: None,
            delta: SummaryDelta::default(),
        });
    };
    let current = ValidationCheck::try_from(row)?;

    match current.plan_update(update, actor, at) {
        CheckUpdatePlan::Unchanged => Ok(RowWrite {
            outcome: CheckWriteOutcome::Unchanged,
            check: Some(current),
            delta: SummaryDelta::default(),
        }),
        CheckUpdatePlan::Locked => Ok(RowWrite {
            outcome: CheckWriteOutcome::Locked,
            check: Some(current),
            delta: SummaryDelta::default(),
        }),
        CheckUpdatePlan::Apply {
            next,
            delta,
            overrode_not_applicable,
        } => {
            sqlx::query(
                r#"
                UPDATE validation_checks
                SET is_checked = $4,
                    status = $5,
                    checked_by = $6,
                    checked_at = $7
                WHERE tenant_id = $1 AND system_id = $2 AND check_id = $3
                "#,
            )
            .bind(tenant_id.as_uuid())
            .bind(system_id)
            .bind(next.check_id.as_str())
            .bind(next.is_checked)
            .bind(next.status.as_str())
            .bind(next.checked_by.as_deref())
            .bind(next.checked_at)
            .execute(&mut *connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to write validation check '{}': {error}",
                    next.check_id
                ))
            })?;

            Ok(RowWrite {
                outcome: CheckWriteOutcome::Applied {
                    delta,
                    overrode_not_applicable,
                },
                check: Some(next),
                delta,
            })
        }
    }
}
