//! Delivery gate: turns a decoded result into a requester-facing outcome.

use tracing::{info, warn};

use super::fetch::{Artifact, ArtifactFetcher};
use crate::core::models::{ChatId, DownloadResult, ResultStatus};
use crate::errors::{DeliveryError, FetchError};
use crate::telegram::ChatTransport;

const MIB: u64 = 1024 * 1024;

/// Largest artifact forwarded to the chat transport. Fixed for now, could
/// become a setting if the transport limit changes.
pub const MAX_UPLOAD_BYTES: u64 = 50 * MIB;

#[derive(Debug)]
pub enum Outcome {
    /// Worker-reported failure, relayed as text.
    Notify { chat_id: ChatId, text: String },
    Deliver {
        chat_id: ChatId,
        artifact: Artifact,
        caption: String,
    },
    /// Artifact over the size ceiling. Carries the measured size.
    Reject { chat_id: ChatId, size: u64 },
}

/// What happened, without the artifact. Handy for logs and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivered {
    Notified,
    Video { size: u64 },
    Rejected { size: u64 },
}

#[must_use]
pub fn failure_text(error: &str) -> String {
    format!("Video download failed: {}", error)
}

#[must_use]
pub fn too_large_text(size: u64) -> String {
    format!(
        "File is too large ({} MB), maximum is {} MB",
        size / MIB,
        MAX_UPLOAD_BYTES / MIB
    )
}

#[must_use]
pub fn caption_text(url: &str) -> String {
    format!("Video downloaded: {}", url)
}

/// Decides the outcome for `result`. Only successful results touch the blob
/// store.
///
/// # Errors
///
/// Returns the fetch error when the artifact cannot be retrieved.
pub async fn decide(
    result: &DownloadResult,
    fetcher: &ArtifactFetcher,
) -> Result<Outcome, FetchError> {
    let location = match &result.status {
        ResultStatus::Failure(error) => {
            return Ok(Outcome::Notify {
                chat_id: result.chat_id,
                text: failure_text(error),
            });
        }
        ResultStatus::Success(location) => location,
    };

    let artifact = fetcher.fetch(location).await?;
    let size = artifact.len();
    if size > MAX_UPLOAD_BYTES {
        return Ok(Outcome::Reject {
            chat_id: result.chat_id,
            size,
        });
    }

    Ok(Outcome::Deliver {
        chat_id: result.chat_id,
        artifact,
        caption: caption_text(&result.url),
    })
}

/// Sends `outcome` through `transport`. The artifact, if any, is released
/// when this returns.
///
/// # Errors
///
/// Returns the transport error for notify and deliver. A failed size-limit
/// notice is only logged.
pub async fn dispatch(
    outcome: Outcome,
    transport: &dyn ChatTransport,
) -> Result<Delivered, DeliveryError> {
    match outcome {
        Outcome::Notify { chat_id, text } => {
            transport.send_text(chat_id, &text).await?;
            Ok(Delivered::Notified)
        }
        Outcome::Reject { chat_id, size } => {
            info!(chat_id, size, "Artifact exceeds upload limit");
            if let Err(e) = transport.send_text(chat_id, &too_large_text(size)).await {
                warn!(chat_id, error = %e, "Failed to send size-limit notice");
            }
            Ok(Delivered::Rejected { size })
        }
        Outcome::Deliver {
            chat_id,
            artifact,
            caption,
        } => {
            transport.send_video(chat_id, &artifact, &caption).await?;
            Ok(Delivered::Video {
                size: artifact.len(),
            })
        }
    }
}
