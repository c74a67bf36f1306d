use futures::StreamExt;
use lapin::Channel;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions};
use lapin::types::FieldTable;
use tracing::{error, info};

use crate::errors::ConnectionError;
use crate::worker::{Disposition, ResultHandler};

const CONSUMER_TAG: &str = "shortsbot-results";

pub struct ResultConsumer {
    channel: Channel,
    queue: String,
}

impl ResultConsumer {
    /// `channel` must come from [`crate::broker::Broker::connect_consumer`] so the
    /// prefetch limit is in place.
    #[must_use]
    pub fn new(channel: Channel, queue: impl Into<String>) -> Self {
        Self {
            channel,
            queue: queue.into(),
        }
    }

    /// Consumes the results queue until the broker closes the subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be started or the delivery
    /// stream fails.
    pub async fn run(&self, handler: &ResultHandler) -> Result<(), ConnectionError> {
        let mut deliveries = self
            .channel
            .basic_consume(
                &self.queue,
                CONSUMER_TAG,
                BasicConsumeOptions {
                    no_ack: false,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        info!(queue = %self.queue, "Started consuming results queue");

        while let Some(delivery) = deliveries.next().await {
            let delivery = delivery?;
            let disposition = handler.process(&delivery.data).await;
            settle(&delivery, disposition).await;
        }

        info!(queue = %self.queue, "Results subscription closed");
        Ok(())
    }
}

/// Nack options for `disposition`, or `None` when the delivery is acked.
/// Only the single delivery is settled, never everything up to its tag.
fn nack_options(disposition: Disposition) -> Option<BasicNackOptions> {
    let requeue = match disposition {
        Disposition::Ack => return None,
        Disposition::Requeue => true,
        Disposition::Discard => false,
    };
    Some(BasicNackOptions {
        multiple: false,
        requeue,
    })
}

/// Applies `disposition` to the delivery. A failed ack is only logged: the
/// broker redelivers the message once the channel goes away.
async fn settle(delivery: &Delivery, disposition: Disposition) {
    let outcome = match nack_options(disposition) {
        None => delivery.ack(BasicAckOptions::default()).await,
        Some(options) => delivery.nack(options).await,
    };

    if let Err(e) = outcome {
        error!(
            delivery_tag = delivery.delivery_tag,
            ?disposition,
            error = %e,
            "Failed to settle delivery"
        );
    }
}
