//! Broker connection management.
//!
//! A [`Broker`] owns one AMQP connection and one channel. It is built once at
//! startup, handed to the publisher or consumer that uses it, and closed
//! explicitly on shutdown so unacknowledged deliveries go back to the queue.

pub mod consumer;
pub mod publisher;

use std::future::Future;
use std::time::Duration;

use lapin::options::{BasicQosOptions, ConfirmSelectOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties};
use tokio::time::Instant;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{info, warn};

use crate::core::config::BrokerConfig;
use crate::errors::ConnectionError;

pub use consumer::ResultConsumer;
pub use publisher::TaskPublisher;

/// First retry delay.
pub const BACKOFF_BASE: Duration = Duration::from_millis(500);
/// Cap on a single retry delay.
pub const BACKOFF_MAX_DELAY: Duration = Duration::from_secs(5);

/// Unacknowledged deliveries allowed per consumer.
pub const CONSUMER_PREFETCH: u16 = 1;

/// Doubling delays from [`BACKOFF_BASE`], capped at [`BACKOFF_MAX_DELAY`].
pub fn connect_backoff() -> impl Iterator<Item = Duration> {
    // from_millis(2).factor(250) yields 500ms, 1s, 2s, ...
    ExponentialBackoff::from_millis(2)
        .factor(BACKOFF_BASE.as_millis() as u64 / 2)
        .max_delay(BACKOFF_MAX_DELAY)
}

#[derive(Debug)]
enum AttemptError {
    Broker(lapin::Error),
    TimedOut,
}

/// Runs `attempt` with backoff until it succeeds or `max_wait` of wall-clock
/// time has passed. Attempts and sleeps are both cut short at the deadline.
pub async fn retry_within<F, Fut, T>(
    max_wait: Duration,
    mut attempt: F,
) -> Result<T, ConnectionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, lapin::Error>>,
{
    let started = Instant::now();
    let deadline = started + max_wait;

    let delays = connect_backoff()
        .map(move |delay| delay.min(deadline.saturating_duration_since(Instant::now())));
    let action = || {
        let fut = attempt();
        async move {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, fut).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => {
                    warn!(error = %e, "Broker connect attempt failed");
                    Err(AttemptError::Broker(e))
                }
                Err(_) => {
                    warn!("Broker connect attempt timed out");
                    Err(AttemptError::TimedOut)
                }
            }
        }
    };
    let before_deadline = |_: &AttemptError| Instant::now() < deadline;

    RetryIf::spawn(delays, action, before_deadline)
        .await
        .map_err(|e| {
            let waited = started.elapsed();
            match e {
                AttemptError::Broker(source) => {
                    ConnectionError::RetriesExhausted { waited, source }
                }
                AttemptError::TimedOut => ConnectionError::Timeout(waited),
            }
        })
}

/// An open connection plus channel with the required queues declared.
pub struct Broker {
    connection: Connection,
    channel: Channel,
}

impl Broker {
    /// Connects with bounded retry, opens a channel and declares `queues` as
    /// durable, non-exclusive queues.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError` if the broker stays unreachable for
    /// `config.connect_timeout` or channel setup fails.
    pub async fn connect(
        config: &BrokerConfig,
        queues: &[&str],
    ) -> Result<Self, ConnectionError> {
        let uri = config.amqp_uri();
        let connection = retry_within(config.connect_timeout, || {
            Connection::connect(&uri, ConnectionProperties::default())
        })
        .await?;
        info!(host = %config.host, port = config.port, "Connected to broker");

        let channel = connection.create_channel().await?;
        for queue in queues {
            channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        exclusive: false,
                        auto_delete: false,
                        ..QueueDeclareOptions::default()
                    },
                    FieldTable::default(),
                )
                .await?;
            info!(queue = %queue, "Declared durable queue");
        }

        Ok(Self {
            connection,
            channel,
        })
    }

    /// Connection for the publishing side: task queue declared, publisher
    /// confirms enabled.
    pub async fn connect_publisher(config: &BrokerConfig) -> Result<Self, ConnectionError> {
        let broker = Self::connect(config, &[config.task_queue.as_str()]).await?;
        broker
            .channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        Ok(broker)
    }

    /// Connection for the consuming side: results queue declared, prefetch of
    /// one so results are handled strictly one at a time.
    pub async fn connect_consumer(config: &BrokerConfig) -> Result<Self, ConnectionError> {
        let broker = Self::connect(config, &[config.results_queue.as_str()]).await?;
        broker
            .channel
            .basic_qos(CONSUMER_PREFETCH, BasicQosOptions::default())
            .await?;
        Ok(broker)
    }

    #[must_use]
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Closes channel then connection. Errors are logged, not returned.
    pub async fn close(&self) {
        if let Err(e) = self.channel.close(200, "shutdown").await {
            warn!(error = %e, "Failed to close broker channel");
        }
        if let Err(e) = self.connection.close(200, "shutdown").await {
            warn!(error = %e, "Failed to close broker connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_then_caps() {
        let delays: Vec<_> = connect_backoff().take(6).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(5),
                Duration::from_secs(5),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_wait() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let started = tokio::time::Instant::now();

        let result: Result<(), _> = retry_within(Duration::from_secs(10), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(lapin::Error::ChannelsLimitReached) }
        })
        .await;

        assert!(matches!(
            result,
            Err(ConnectionError::RetriesExhausted { .. })
        ));
        // Attempts at 0, 0.5, 1.5, 3.5 and 7.5s, then a last one at the 10s
        // deadline after a shortened sleep.
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_are_cut_off_at_the_deadline() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let started = tokio::time::Instant::now();

        let result: Result<(), _> = retry_within(Duration::from_secs(10), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(20)).await;
                Err(lapin::Error::ChannelsLimitReached)
            }
        })
        .await;

        assert!(matches!(result, Err(ConnectionError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_budget_means_single_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = retry_within(Duration::ZERO, || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(lapin::Error::ChannelsLimitReached) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_retrying_on_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry_within(Duration::from_secs(60), || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(lapin::Error::ChannelsLimitReached)
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
