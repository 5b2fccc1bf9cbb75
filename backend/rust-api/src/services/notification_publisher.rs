use anyhow::{Context, Result};
use chrono::Utc;
use redis::aio::ConnectionManager;

/// Fire-and-forget event emission for UI real-time updates over Redis
/// pub/sub. Failure here must never affect the settlement outcome.
pub struct NotificationPublisher {
    redis: ConnectionManager,
}

impl NotificationPublisher {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    pub async fn publish(
        &self,
        user_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        let mut conn = self.redis.clone();
        let channel = format!("notifications:{}", user_id);

        let message = serde_json::to_string(&serde_json::json!({
            "event_type": event_type,
            "payload": payload,
            "sent_at": Utc::now(),
        }))
        .context("Failed to serialize notification")?;

        redis::cmd("PUBLISH")
            .arg(&channel)
            .arg(&message)
            .query_async::<()>(&mut conn)
            .await
            .context("Failed to publish notification")?;

        Ok(())
    }

    /// Swallows and logs the error; callers never observe publish failures.
    pub async fn publish_best_effort(
        &self,
        user_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) {
        if let Err(e) = self.publish(user_id, event_type, payload).await {
            tracing::warn!(
                "Notification publish failed (ignored): user={}, event={}: {:#}",
                user_id,
                event_type,
                e
            );
        }
    }
}
