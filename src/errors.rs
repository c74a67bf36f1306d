use std::time::Duration;

use thiserror::Error;

/// Broker unreachable or queue setup failed. Fatal at startup once the retry
/// budget is spent.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to connect to broker after {waited:?}: {source}")]
    RetriesExhausted {
        waited: Duration,
        #[source]
        source: lapin::Error,
    },

    #[error("Timed out connecting to broker after {0:?}")]
    Timeout(Duration),

    #[error("Failed to set up broker channel: {0}")]
    Channel(#[from] lapin::Error),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to serialize task: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to publish task: {0}")]
    Broker(#[from] lapin::Error),

    #[error("Broker rejected task {0}")]
    Rejected(String),

    #[error("Timed out publishing task after {0:?}")]
    Timeout(Duration),
}

/// Malformed result message. Never retried.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to parse result message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Result message {id} is missing {field}")]
    MissingField { id: String, field: &'static str },
}

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Failed to access blob store: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Store(#[from] BlobStoreError),

    #[error("Failed to write artifact to temporary storage: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out fetching artifact after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Failed to send HTTP request: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Chat API rejected request: {0}")]
    Api(String),

    #[error("Failed to read artifact: {0}")]
    Io(#[from] std::io::Error),
}

/// Operational failure while handling a decoded result. Causes a requeue.
#[derive(Debug, Error)]
pub enum HandlingError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}
