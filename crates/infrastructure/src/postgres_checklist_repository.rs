mod initialize;
mod reads;
mod updates;


use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool};

use accessledger_application::{
    AppliedCheckUpdates, ChecklistRepository, ChecklistSystemKey, InsertChecksOutcome,
    ResetSystemOutcome, SummaryReconciliation,
};
use accessledger_core::{AppError, AppResult, TenantId};
use accessledger_domain::{
    CheckStatus, CheckUpdate, SummaryStatus, ValidationCheck, ValidationSummary,
};

/// PostgreSQL-backed repository for validation checks and summaries.
///
/// Every write locks the system's summary row first, which serializes
/// writers of the same system and keeps row deltas and the summary in one
/// transaction.
#[derive(Clone)]
pub struct PostgresChecklistRepository {
    pool: PgPool,
}

impl PostgresChecklistRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ValidationCheckRow {
    system_id: String,
    category_id: String,
    check_id: String,
    is_checked: bool,
    status: String,
    checked_by: Option<String>,
    checked_at: Option<DateTime<Utc>>,
}

impl TryFrom<ValidationCheckRow> for ValidationCheck {
    type Error = AppError;

    fn try_from(row: ValidationCheckRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: CheckStatus::from_str(row.status.as_str())?,
            system_id: row.system_id,
            category_id: row.category_id,
            check_id: row.check_id,
            is_checked: row.is_checked,
            checked_by: row.checked_by,
            checked_at: row.checked_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ValidationSummaryRow {
    system_id: String,
    total_checks: i32,
    completed_checks: i32,
    status: String,
    last_validated_at: Option<DateTime<Utc>>,
    last_validated_by: Option<String>,
}

impl TryFrom<ValidationSummaryRow> for ValidationSummary {
    type Error = AppError;

    fn try_from(row: ValidationSummaryRow) -> Result<Self, Self::Error> {
        let total_checks = u32::try_from(row.total_checks).map_err(|_| {
            AppError::Internal(format!(
                "summary of system '{}' has a negative total",
                row.system_id
            ))
        })?;
        let completed_checks = u32::try_from(row.completed_checks).map_err(|_| {
            AppError::Internal(format!(
                "summary of system '{}' has a negative completed count",
                row.system_id
            ))
        })?;

        Ok(Self {
            status: SummaryStatus::from_str(row.status.as_str())?,
            system_id: row.system_id,
            total_checks,
            completed_checks,
            last_validated_at: row.last_validated_at,
            last_validated_by: row.last_validated_by,
        })
    }
}

fn counter(value: u32, label: &str) -> AppResult<i32> {
    i32::try_from(value)
        .map_err(|_| AppError::Internal(format!("summary {label} {value} exceeds storage range")))
}

async fn lock_summary(
    connection: &mut PgConnection,
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
        FOR UPDATE
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(system_id)
    .fetch_optional(&mut *connection)
    .await
    .map_err(|error| AppError::Internal(format!("failed to lock validation summary: {error}")))?;

    row.map(ValidationSummary::try_from).transpose()
}

async fn write_summary(
    connection: &mut PgConnection,
    tenant_id: TenantId,
    summary: &ValidationSummary,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE validation_summaries
        SET total_checks = $3,
            completed_checks = $4,
            status = $5,
            last_validated_at = $6,
            last_validated_by = $7
        WHERE tenant_id = $1 AND system_id = $2
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(summary.system_id.as_str())
    .bind(counter(summary.total_checks, "total")?)
    .bind(counter(summary.completed_checks, "completed count")?)
    .bind(summary.status.as_str())
    .bind(summary.last_validated_at)
    .bind(summary.last_validated_by.as_deref())
    .execute(&mut *connection)
    .await
    .map_err(|error| AppError::Internal(format!("failed to write validation summary: {error}")))?;

    Ok(())
}

async fn scan_summary(
    connection: &mut PgConnection,
    tenant_id: TenantId,
    system_id: &str,
) -> AppResult<ValidationSummary> {
    let (total, completed) = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE status <> 'not_applicable'),
            COUNT(*) FILTER (WHERE is_checked)
        FROM validation_checks
        WHERE tenant_id = $1 AND system_id = $2
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(system_id)
    .fetch_one(&mut *connection)
    .await
    .map_err(|error| AppError::Internal(format!("failed to scan validation checks: {error}")))?;

    let total = u32::try_from(total)
        .map_err(|_| AppError::Internal(format!("system '{system_id}' has too many checks")))?;
    let completed = u32::try_from(completed)
        .map_err(|_| AppError::Internal(format!("system '{system_id}' has too many checks")))?;

    Ok(ValidationSummary::new(system_id, total, completed))
}

#[async_trait]
impl ChecklistRepository for PostgresChecklistRepository {
    async fn count_checks(&self, tenant_id: TenantId, system_id: &str) -> AppResult<u32> {
        self.count_checks_impl(tenant_id, system_id).await
    }

    async fn insert_missing_checks(
        &self,
        tenant_id: TenantId,
        system_id: &str,
        checks: Vec<ValidationCheck>,
    ) -> AppResult<InsertChecksOutcome> {
        self.insert_missing_checks_impl(tenant_id, system_id, checks)
            .await
    }

    async fn apply_check_updates(
        &self,
        tenant_id: TenantId,
        system_id: &str,
        updates: Vec<CheckUpdate>,
        actor: &str,
        at: DateTime<Utc>,
    ) -> AppResult<AppliedCheckUpdates> {
        self.apply_check_updates_impl(tenant_id, system_id, updates, actor, at)
            .await
    }

    async fn delete_system(
        &self,
        tenant_id: TenantId,
        system_id: &str,
    ) -> AppResult<ResetSystemOutcome> {
        self.delete_system_impl(tenant_id, system_id).await
    }

    async fn find_summary(
        &self,
        tenant_id: TenantId,
        system_id: &str,
    ) -> AppResult<Option<ValidationSummary>> {
        self.find_summary_impl(tenant_id, system_id).await
    }

    async fn list_checks(
        &self,
        tenant_id: TenantId,
        system_id: &str,
    ) -> AppResult<Vec<ValidationCheck>> {
        self.list_checks_impl(tenant_id, system_id).await
    }

    async fn reconcile_summary(
        &self,
        tenant_id: TenantId,
        system_id: &str,
        repair: bool,
    ) -> AppResult<Option<SummaryReconciliation>> {
        self.reconcile_summary_impl(tenant_id, system_id, repair)
            .await
    }

    async fn list_systems(&self) -> AppResult<Vec<ChecklistSystemKey>> {
        self.list_systems_impl().await
    }
}
