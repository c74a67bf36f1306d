use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::DecodeError;

/// Chat routing identifier of the requester.
pub type ChatId = i64;

/// A download request, published to the task queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub url: String,
    pub chat_id: ChatId,
}

impl Task {
    /// Creates a task with a fresh UUIDv4 id.
    #[must_use]
    pub fn new(url: impl Into<String>, chat_id: ChatId) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            chat_id,
        }
    }
}

/// Result message as the worker writes it to the results queue.
///
/// String fields read `null` and absent alike as empty, so a missing status is
/// a failure rather than a malformed message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultMessage {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub s3_url: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub bucket: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub key: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub status: String,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "String::is_empty"
    )]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl std::fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultStatus {
    Success(ObjectLocation),
    Failure(String),
}

/// A decoded result whose status and payload agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    pub id: String,
    pub url: String,
    pub chat_id: ChatId,
    pub status: ResultStatus,
}

const UNKNOWN_ERROR: &str = "unknown error";

impl DownloadResult {
    /// Parses and validates a raw result body.
    ///
    /// # Errors
    ///
    /// Returns a `DecodeError` when the body is not a result message, lacks a
    /// chat id, or reports success without an object location.
    pub fn decode(body: &[u8]) -> Result<Self, DecodeError> {
        let message: ResultMessage = serde_json::from_slice(body)?;
        Self::try_from(message)
    }
}

impl TryFrom<ResultMessage> for DownloadResult {
    type Error = DecodeError;

    fn try_from(message: ResultMessage) -> Result<Self, Self::Error> {
        let missing = |field| DecodeError::MissingField {
            id: message.id.clone(),
            field,
        };

        let chat_id = message.chat_id.ok_or_else(|| missing("chat_id"))?;

        // Anything other than "success" is a worker-reported failure.
        let status = if message.status == "success" {
            if message.bucket.is_empty() {
                return Err(missing("bucket"));
            }
            if message.key.is_empty() {
                return Err(missing("key"));
            }
            ResultStatus::Success(ObjectLocation {
                bucket: message.bucket,
                key: message.key,
            })
        } else if message.error.trim().is_empty() {
            ResultStatus::Failure(UNKNOWN_ERROR.to_string())
        } else {
            ResultStatus::Failure(message.error)
        };

        Ok(Self {
            id: message.id,
            url: message.url,
            chat_id,
            status,
        })
    }
}
