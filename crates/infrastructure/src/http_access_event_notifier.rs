use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::warn;

use accessledger_application::{AccessEventNotifier, AccessNotification};
use accessledger_core::{AppError, AppResult};

/// Webhook notifier that posts access changes to an external dispatcher.
///
/// `notify` returns as soon as delivery is scheduled. Delivery runs on a
/// spawned task with bounded retries and only logs its final failure.
#[derive(Clone)]
pub struct HttpAccessEventNotifier {
    http_client: reqwest::Client,
    endpoint: String,
    max_attempts: u8,
    retry_backoff_ms: u64,
}

impl HttpAccessEventNotifier {
    /// Creates a webhook notifier.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        endpoint: impl Into<String>,
        max_attempts: u8,
        retry_backoff_ms: u64,
    ) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
            max_attempts: max_attempts.max(1),
            retry_backoff_ms: retry_backoff_ms.max(50),
        }
    }

    fn payload(notification: &AccessNotification) -> Value {
        json!({
            "event": notification.kind.as_str(),
            "tenant_id": notification.tenant_id.to_string(),
            "actor": notification.actor,
            "recipients": notification.recipients,
            "resource_id": notification.resource_id,
            "detail": notification.detail,
            "occurred_at": notification.occurred_at.to_rfc3339(),
        })
    }

    fn idempotency_key(notification: &AccessNotification) -> String {
        format!(
            "{}:{}:{}",
            notification.kind.as_str(),
            notification.resource_id,
            notification.occurred_at.timestamp_micros()
        )
    }

    async fn deliver(&self, notification: &AccessNotification) -> AppResult<()> {
        let payload = Self::payload(notification);
        let idempotency_key = Self::idempotency_key(notification);

        let mut attempt = 0_u8;
        let mut last_error: Option<String> = None;

        while attempt < self.max_attempts {
            attempt = attempt.saturating_add(1);
            let response = self
                .http_client
                .post(self.endpoint.as_str())
                .header("Idempotency-Key", idempotency_key.as_str())
                .header("X-Accessledger-Event", notification.kind.as_str())
                .json(&payload)
                .send()
                .await;

            match response {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response)
                    if response.status().is_server_error()
                        || response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS =>
                {
                    last_error = Some(format!(
                        "transient HTTP status {} for notification '{idempotency_key}'",
                        response.status()
                    ));
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<response body unavailable>".to_owned());
                    return Err(AppError::Validation(format!(
                        "notification dispatcher rejected '{idempotency_key}' with status {status}: {body}"
                    )));
                }
                Err(error) => {
                    last_error = Some(format!("notification transport error: {error}"));
                }
            }

            if attempt < self.max_attempts {
                let delay = self.retry_backoff_ms.saturating_mul(u64::from(attempt));
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        Err(AppError::Internal(last_error.unwrap_or_else(|| {
            format!("notification '{idempotency_key}' was not delivered")
        })))
    }
}

#[async_trait]
impl AccessEventNotifier for HttpAccessEventNotifier {
    async fn notify(&self, notification: AccessNotification) -> AppResult<()> {
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(error) = notifier.deliver(&notification).await {
                warn!(
                    error = %error,
                    tenant_id = %notification.tenant_id,
                    event = notification.kind.as_str(),
                    resource_id = %notification.resource_id,
                    "access notification delivery failed"
                );
            }
        });

        Ok(())
    }
}
