//! Chat transport used to reply to requesters and deliver media

pub mod client;

use async_trait::async_trait;

use crate::core::models::ChatId;
use crate::errors::DeliveryError;
use crate::worker::fetch::Artifact;

pub use client::{TelegramClient, Update};

/// Outbound side of the chat interface. Shared between the command loop and
/// the result consumer, so implementations must be usable concurrently.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), DeliveryError>;

    /// Uploads the artifact as a video, reading it from the start.
    async fn send_video(
        &self,
        chat_id: ChatId,
        artifact: &Artifact,
        caption: &str,
    ) -> Result<(), DeliveryError>;
}
