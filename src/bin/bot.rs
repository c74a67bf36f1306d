use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use shortsbot::api::run_command_loop;
use shortsbot::broker::{Broker, ResultConsumer, TaskPublisher};
use shortsbot::core::config::AppConfig;
use shortsbot::storage::S3BlobStore;
use shortsbot::telegram::TelegramClient;
use shortsbot::worker::{ArtifactFetcher, ResultHandler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shortsbot::setup_logging();

    let config = AppConfig::from_env().map_err(anyhow::Error::msg)?;

    let publisher_broker = Broker::connect_publisher(&config.broker)
        .await
        .context("publisher init")?;
    let consumer_broker = Broker::connect_consumer(&config.broker)
        .await
        .context("consumer init")?;

    let telegram = Arc::new(TelegramClient::new(&config.bot_token));
    let store = Arc::new(S3BlobStore::from_config(&config.blob_store).await);

    let publisher = TaskPublisher::new(
        publisher_broker.channel().clone(),
        config.broker.task_queue.clone(),
    );
    let consumer = ResultConsumer::new(
        consumer_broker.channel().clone(),
        config.broker.results_queue.clone(),
    );
    let mut fetcher = ArtifactFetcher::new(store);
    if let Some(dir) = &config.artifact_dir {
        fetcher = fetcher.in_dir(dir);
    }
    let handler = ResultHandler::new(
        fetcher,
        telegram.clone(),
        config.result_max_attempts,
    );

    info!("Bot started");

    // Consumer and command polling run on separate tasks.
    let mut consumer_task = tokio::spawn(async move { consumer.run(&handler).await });
    let commands_client = telegram.clone();
    let mut command_task =
        tokio::spawn(async move { run_command_loop(&commands_client, &publisher).await });

    tokio::select! {
        joined = &mut consumer_task => match joined {
            Ok(Ok(())) => info!("Result consumer finished"),
            Ok(Err(e)) => error!(error = %e, "Result consumer stopped"),
            Err(e) => error!(error = %e, "Result consumer task failed"),
        },
        joined = &mut command_task => {
            if let Err(e) = joined {
                error!(error = %e, "Command loop task failed");
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    // Whatever is still in flight is dropped; unacked results come back once
    // the consumer channel closes.
    consumer_task.abort();
    command_task.abort();

    consumer_broker.close().await;
    publisher_broker.close().await;
    Ok(())
}
