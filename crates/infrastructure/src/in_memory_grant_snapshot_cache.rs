use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use accessledger_application::{GrantSnapshot, GrantSnapshotCache};
use accessledger_core::{AppResult, TenantId};

#[derive(Debug, Clone)]
struct GrantSnapshotCacheEntry {
    snapshot: GrantSnapshot,
    expires_at: Instant,
}

/// In-memory cache adapter for grant snapshots.
#[derive(Debug, Default)]
pub struct InMemoryGrantSnapshotCache {
    entries: RwLock<HashMap<(TenantId, String), GrantSnapshotCacheEntry>>,
}

impl InMemoryGrantSnapshotCache {
    /// Creates an empty snapshot cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GrantSnapshotCache for InMemoryGrantSnapshotCache {
    async fn get_snapshot(
        &self,
        tenant_id: TenantId,
        subject: &str,
    ) -> AppResult<Option<GrantSnapshot>> {
        let key = (tenant_id, subject.to_owned());
        {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Ok(Some(entry.snapshot.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut entries = self.entries.write().await;
        if entries
            .get(&key)
            .is_some_and(|entry| entry.expires_at <= Instant::now())
        {
            entries.remove(&key);
        }

        Ok(None)
    }

    async fn set_snapshot(
        &self,
        tenant_id: TenantId,
        snapshot: &GrantSnapshot,
        ttl_seconds: u32,
    ) -> AppResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }

        let now = Instant::now();
        let expires_at = now
            .checked_add(Duration::from_secs(u64::from(ttl_seconds)))
            .unwrap_or(now);

        self.entries.write().await.insert(
            (tenant_id, snapshot.subject.clone()),
            GrantSnapshotCacheEntry {
                snapshot: snapshot.clone(),
                expires_at,
            },
        );

        Ok(())
    }

    async fn invalidate_subject(&self, tenant_id: TenantId, subject: &str) -> AppResult<()> {
        self.entries
            .write()
            .await
            .remove(&(tenant_id, subject.to_owned()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use accessledger_application::{GrantSnapshot, GrantSnapshotCache};
    use accessledger_core::TenantId;

    use super::InMemoryGrantSnapshotCache;

    fn snapshot(subject: &str) -> GrantSnapshot {
        GrantSnapshot {
            subject: subject.to_owned(),
            active_assignments: Vec::new(),
            incoming_delegations: Vec::new(),
        }
    }

    #[tokio::test]
    async fn stores_and_invalidates_per_tenant_subject() {
        let cache = InMemoryGrantSnapshotCache::new();
        let tenant_id = TenantId::new();

        cache
            .set_snapshot(tenant_id, &snapshot("alice"), 30)
            .await
            .unwrap_or_else(|error| panic!("{error}"));

        let hit = cache
            .get_snapshot(tenant_id, "alice")
            .await
            .unwrap_or_else(|error| panic!("{error}"));
        assert_eq!(hit, Some(snapshot("alice")));

        let other_tenant = cache
            .get_snapshot(TenantId::new(), "alice")
            .await
            .unwrap_or_else(|error| panic!("{error}"));
        assert!(other_tenant.is_none());

        cache
            .invalidate_subject(tenant_id, "alice")
            .await
            .unwrap_or_else(|error| panic!("{error}"));
        let miss = cache
            .get_snapshot(tenant_id, "alice")
            .await
            .unwrap_or_else(|error| panic!("{error}"));
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn zero_ttl_is_not_stored() {
        let cache = InMemoryGrantSnapshotCache::new();
        let tenant_id = TenantId::new();

        cache
            .set_snapshot(tenant_id, &snapshot("bob"), 0)
            .await
            .unwrap_or_else(|error| panic!("{error}"));

        let miss = cache
            .get_snapshot(tenant_id, "bob")
            .await
            .unwrap_or_else(|error| panic!("{error}"));
        assert!(miss.is_none());
    }
}
