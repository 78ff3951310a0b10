use accessledger_core::{AppResult, TenantId};
use accessledger_domain::AuditAction;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Immutable audit event payload emitted by application services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    /// Tenant scope for the event.
    pub tenant_id: TenantId,
    /// Subject that performed the action.
    pub subject: String,
    /// Stable audit action identifier.
    pub action: AuditAction,
    /// Resource type label.
    pub resource_type: String,
    /// Resource identifier.
    pub resource_id: String,
    /// Optional audit detail payload.
    pub detail: Option<String>,
}

/// Audit event as stored, with the time it was recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditLogEntry {
    /// Stored event.
    pub event: AuditEvent,
    /// Storage timestamp.
    pub recorded_at: DateTime<Utc>,
}

/// Filter for audit trail reads. Results are newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditLogQuery {
    /// Restrict to one resource type such as `delegation_rule`.
    pub resource_type: Option<String>,
    /// Restrict to one resource identifier.
    pub resource_id: Option<String>,
    /// Maximum number of entries.
    pub limit: usize,
}

/// Port for the append-only audit log.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Persists one audit event.
    async fn append_event(&self, event: AuditEvent) -> AppResult<()>;

    /// Reads the most recent events of one tenant.
    async fn list_recent_events(
        &self,
        tenant_id: TenantId,
        query: AuditLogQuery,
    ) -> AppResult<Vec<AuditLogEntry>>;
}

impl AuditLogQuery {
    /// Returns whether one stored event passes this filter.
    #[must_use]
    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.resource_type
            .as_deref()
            .is_none_or(|resource_type| event.resource_type == resource_type)
            && self
                .resource_id
                .as_deref()
                .is_none_or(|resource_id| event.resource_id == resource_id)
    }
}
