//! Redis-backed grant snapshot cache.

use async_trait::async_trait;
use redis::AsyncCommands;

use accessledger_application::{GrantSnapshot, GrantSnapshotCache};
use accessledger_core::{AppError, AppResult, TenantId};

/// Redis implementation of the grant snapshot cache port.
///
/// Entries hold raw assignment and delegation rows as JSON, never resolved
/// permission sets, so validity is always recomputed by the caller.
#[derive(Clone)]
pub struct RedisGrantSnapshotCache {
    client: redis::Client,
    key_prefix: String,
}

impl RedisGrantSnapshotCache {
    /// Creates a cache adapter with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, tenant_id: TenantId, subject: &str) -> String {
        format!("{}:tenant={tenant_id}:subject={subject}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl GrantSnapshotCache for RedisGrantSnapshotCache {
    async fn get_snapshot(
        &self,
        tenant_id: TenantId,
        subject: &str,
    ) -> AppResult<Option<GrantSnapshot>> {
        let key = self.key_for(tenant_id, subject);
        let mut connection = self.connection().await?;

        let encoded: Option<String> = connection.get(key).await.map_err(|error| {
            AppError::Internal(format!("failed to read grant snapshot cache entry: {error}"))
        })?;

        encoded
            .as_deref()
            .map(|value| {
                serde_json::from_str::<GrantSnapshot>(value).map_err(|error| {
                    AppError::Internal(format!("invalid grant snapshot cache value: {error}"))
                })
            })
            .transpose()
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

        let key = self.key_for(tenant_id, snapshot.subject.as_str());
        let value = serde_json::to_string(snapshot).map_err(|error| {
            AppError::Internal(format!("failed to encode grant snapshot: {error}"))
        })?;
        let mut connection = self.connection().await?;

        connection
            .set_ex(key, value, u64::from(ttl_seconds))
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to write grant snapshot cache entry: {error}"))
            })
    }

    async fn invalidate_subject(&self, tenant_id: TenantId, subject: &str) -> AppResult<()> {
        let key = self.key_for(tenant_id, subject);
        let mut connection = self.connection().await?;

        connection.del(key).await.map_err(|error| {
            AppError::Internal(format!("failed to drop grant snapshot cache entry: {error}"))
        })
    }
}
