/// shortsbot - a chat bot that hands YouTube Shorts downloads to a worker pool.
///
/// The bot publishes download tasks to a durable AMQP queue and consumes the
/// workers' results from a second queue. Successful results point at an object
/// in S3-compatible storage, which is fetched into a temporary file and sent
/// back to the requesting chat if it fits the upload limit.
///
/// # Architecture
///
/// - `broker` owns connections, the task publisher and the result consumer
/// - `worker` holds the result-handling protocol: fetch, size gate, delivery
/// - `storage` and `telegram` are the blob-store and chat-transport capabilities
/// - `api` parses `/download` commands and queues tasks
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use shortsbot::core::config::AppConfig;
/// use shortsbot::storage::S3BlobStore;
/// use shortsbot::telegram::TelegramClient;
/// use shortsbot::worker::{ArtifactFetcher, ResultHandler};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     shortsbot::setup_logging();
///     let config = AppConfig::from_env()?;
///
///     let store = Arc::new(S3BlobStore::from_config(&config.blob_store).await);
///     let transport = Arc::new(TelegramClient::new(&config.bot_token));
///     let handler = ResultHandler::new(ArtifactFetcher::new(store), transport, 5);
///
///     let body = br#"{"id":"t2","url":"u","status":"failure","error":"network timeout","chat_id":7}"#;
///     println!("{:?}", handler.process(body).await);
///     Ok(())
/// }
/// ```
pub mod api;
pub mod broker;
pub mod core;
pub mod errors;
pub mod storage;
pub mod telegram;
pub mod worker;

/// Configure structured JSON logging.
///
/// Honors `RUST_LOG` and defaults to `info`. Calling it more than once is a
/// no-op.
///
/// # Example
///
/// ```
/// shortsbot::setup_logging();
/// ```
pub fn setup_logging() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let default_level = if cfg!(feature = "debug-logs") {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let fmt_layer = fmt::layer().json().with_target(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
