//! Telegram Bot API client
//!
//! Thin reqwest wrapper over the handful of Bot API methods the bot needs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::info;

use super::ChatTransport;
use crate::core::models::ChatId;
use crate::errors::DeliveryError;
use crate::worker::fetch::Artifact;

const API_BASE: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const VIDEO_FILE_NAME: &str = "video.mp4";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

pub struct TelegramClient {
    http: Client,
    base_url: String,
}

impl TelegramClient {
    #[must_use]
    pub fn new(token: &str) -> Self {
        Self::with_api_base(API_BASE, token)
    }

    /// Points the client at a different Bot API server.
    #[must_use]
    pub fn with_api_base(api_base: &str, token: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn parse<T: DeserializeOwned>(
        method: &str,
        resp: reqwest::Response,
    ) -> Result<T, DeliveryError> {
        let status = resp.status();
        let body: ApiResponse<T> = resp.json().await?;
        match body {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(DeliveryError::Api(format!(
                "{} failed ({}): {}",
                method,
                status,
                description.unwrap_or_else(|| "no description".to_string())
            ))),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<T, DeliveryError> {
        let resp = self
            .http
            .post(self.method_url(method))
            .timeout(timeout)
            .json(payload)
            .send()
            .await?;
        Self::parse(method, resp).await
    }

    /// Long-polls for updates after `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Telegram reports an error.
    pub async fn get_updates(
        &self,
        offset: i64,
        poll_timeout: Duration,
    ) -> Result<Vec<Update>, DeliveryError> {
        let payload = json!({
            "offset": offset,
            "timeout": poll_timeout.as_secs(),
            "allowed_updates": ["message"],
        });
        self.call("getUpdates", &payload, poll_timeout + REQUEST_TIMEOUT)
            .await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or Telegram reports an error.
    pub async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<(), DeliveryError> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(message_id) = reply_to {
            payload["reply_parameters"] = json!({ "message_id": message_id });
        }
        let _: Value = self
            .call("sendMessage", &payload, REQUEST_TIMEOUT)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), DeliveryError> {
        self.send_message(chat_id, text, None).await
    }

    async fn send_video(
        &self,
        chat_id: ChatId,
        artifact: &Artifact,
        caption: &str,
    ) -> Result<(), DeliveryError> {
        let file = artifact.open()?;
        let video = Part::stream_with_length(file, artifact.len())
            .file_name(VIDEO_FILE_NAME)
            .mime_str("video/mp4")?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("video", video);

        let resp = self
            .http
            .post(self.method_url("sendVideo"))
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form)
            .send()
            .await?;
        let _: Value = Self::parse("sendVideo", resp).await?;

        info!(chat_id, bytes = artifact.len(), "Uploaded video");
        Ok(())
    }
}
