use std::time::Duration;

use async_trait::async_trait;
use lapin::options::BasicPublishOptions;
use lapin::{BasicProperties, Channel};
use tracing::info;

use crate::core::models::Task;
use crate::errors::PublishError;

/// Per-call publish budget, confirm included.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// AMQP delivery mode that makes a message survive broker restarts.
const PERSISTENT: u8 = 2;

/// Anything that can accept a task for the worker pool.
#[async_trait]
pub trait TaskSink: Send + Sync {
    /// Publishes once. Retrying is left to the caller.
    async fn publish(&self, task: &Task) -> Result<(), PublishError>;
}

pub struct TaskPublisher {
    channel: Channel,
    queue: String,
}

impl TaskPublisher {
    /// `channel` must come from [`crate::broker::Broker::connect_publisher`] so
    /// confirms are enabled.
    #[must_use]
    pub fn new(channel: Channel, queue: impl Into<String>) -> Self {
        Self {
            channel,
            queue: queue.into(),
        }
    }

    async fn publish_confirmed(&self, body: &[u8], task_id: &str) -> Result<(), PublishError> {
        let confirm = self
            .channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default()
                    .with_delivery_mode(PERSISTENT)
                    .with_content_type("application/json".into()),
            )
            .await?;

        if confirm.await?.is_nack() {
            return Err(PublishError::Rejected(task_id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskSink for TaskPublisher {
    async fn publish(&self, task: &Task) -> Result<(), PublishError> {
        let body = serde_json::to_vec(task)?;
        tokio::time::timeout(PUBLISH_TIMEOUT, self.publish_confirmed(&body, &task.id))
            .await
            .map_err(|_| PublishError::Timeout(PUBLISH_TIMEOUT))??;

        info!(task_id = %task.id, queue = %self.queue, "Published task");
        Ok(())
    }
}
