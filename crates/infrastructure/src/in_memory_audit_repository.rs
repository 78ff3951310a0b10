use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use accessledger_application::{AuditEvent, AuditLogEntry, AuditLogQuery, AuditRepository};
use accessledger_core::{AppResult, TenantId};

/// In-memory append-only audit log for composition tests.
#[derive(Debug, Default)]
pub struct InMemoryAuditRepository {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl InMemoryAuditRepository {
    /// Creates an empty audit log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the events of one tenant in append order.
    pub async fn events_for(&self, tenant_id: TenantId) -> Vec<AuditEvent> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|entry| entry.event.tenant_id == tenant_id)
            .map(|entry| entry.event.clone())
            .collect()
    }
}

#[async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
        self.entries.write().await.push(AuditLogEntry {
            event,
            recorded_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_recent_events(
        &self,
        tenant_id: TenantId,
        query: AuditLogQuery,
    ) -> AppResult<Vec<AuditLogEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .rev()
            .filter(|entry| entry.event.tenant_id == tenant_id && query.matches(&entry.event))
            .take(query.limit)
            .cloned()
            .collect())
    }
}
