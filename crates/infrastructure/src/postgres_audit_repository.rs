use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use accessledger_application::{AuditEvent, AuditLogEntry, AuditLogQuery, AuditRepository};
use accessledger_core::{AppError, AppResult, TenantId};
use accessledger_domain::AuditAction;

/// PostgreSQL-backed append-only audit log.
#[derive(Clone)]
pub struct PostgresAuditRepository {
    pool: PgPool,
}

impl PostgresAuditRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AuditLogRow {
    tenant_id: Uuid,
    subject: String,
    action: String,
    resource_type: String,
    resource_id: String,
    detail: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditLogRow> for AuditLogEntry {
    type Error = AppError;

    fn try_from(row: AuditLogRow) -> Result<Self, Self::Error> {
        Ok(Self {
            event: AuditEvent {
                tenant_id: TenantId::from_uuid(row.tenant_id),
                subject: row.subject,
                action: row.action.parse::<AuditAction>().map_err(|error| {
                    AppError::Internal(format!("corrupt audit row action: {error}"))
                })?,
                resource_type: row.resource_type,
                resource_id: row.resource_id,
                detail: row.detail,
            },
            recorded_at: row.created_at,
        })
    }
}

#[async_trait]
impl AuditRepository for PostgresAuditRepository {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log_entries (
                tenant_id,
                subject,
                action,
                resource_type,
                resource_id,
                detail
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.tenant_id.as_uuid())
        .bind(event.subject)
        .bind(event.action.as_str())
        .bind(event.resource_type)
        .bind(event.resource_id)
        .bind(event.detail)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to append audit event '{}': {error}",
                event.action.as_str()
            ))
        })?;

        Ok(())
    }

    async fn list_recent_events(
        &self,
        tenant_id: TenantId,
        query: AuditLogQuery,
    ) -> AppResult<Vec<AuditLogEntry>> {
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, AuditLogRow>(
            r#"
            SELECT tenant_id, subject, action, resource_type, resource_id, detail, created_at
            FROM audit_log_entries
            WHERE tenant_id = $1
              AND ($2::TEXT IS NULL OR resource_type = $2)
              AND ($3::TEXT IS NULL OR resource_id = $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(query.resource_type)
        .bind(query.resource_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list audit events for tenant '{tenant_id}': {error}"
            ))
        })?;

        rows.into_iter().map(AuditLogEntry::try_from).collect()
    }
}
