use async_trait::async_trait;
use tracing::info;

use accessledger_application::{AccessEventNotifier, AccessNotification};
use accessledger_core::AppResult;

/// Notifier that writes access changes to the log instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct ConsoleAccessEventNotifier;

impl ConsoleAccessEventNotifier {
    /// Creates a console notifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AccessEventNotifier for ConsoleAccessEventNotifier {
    async fn notify(&self, notification: AccessNotification) -> AppResult<()> {
        info!(
            tenant_id = %notification.tenant_id,
            event = notification.kind.as_str(),
            actor = %notification.actor,
            recipients = ?notification.recipients,
            resource_id = %notification.resource_id,
            "{}",
            notification.detail
        );

        Ok(())
    }
}
