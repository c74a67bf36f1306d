use std::time::Duration;

use tracing::{error, info, warn};

use super::parsing::{DOWNLOAD_COMMAND, is_shorts_url, parse_command};
use crate::broker::publisher::TaskSink;
use crate::core::models::{ChatId, Task};
use crate::telegram::TelegramClient;
use crate::telegram::client::Message;

const POLL_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_ERROR_PAUSE: Duration = Duration::from_secs(3);

pub const USAGE_TEXT: &str = "Send a valid YouTube Shorts URL: /download <url>";
pub const PUBLISH_FAILED_TEXT: &str = "Could not queue the task, please try again later";

/// Reply the requester should get for a command.
#[derive(Debug, PartialEq, Eq)]
pub enum CommandReply {
    Usage,
    Accepted { task_id: String },
    PublishFailed,
}

impl CommandReply {
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Usage => USAGE_TEXT.to_string(),
            Self::Accepted { task_id } => format!("Task accepted, id={}", task_id),
            Self::PublishFailed => PUBLISH_FAILED_TEXT.to_string(),
        }
    }
}

/// Handles one incoming text. Returns `None` when the text is not ours.
pub async fn handle_command(
    text: &str,
    chat_id: ChatId,
    sink: &dyn TaskSink,
) -> Option<CommandReply> {
    let command = parse_command(text).filter(|c| c.name == DOWNLOAD_COMMAND)?;
    if !is_shorts_url(command.args) {
        return Some(CommandReply::Usage);
    }

    let task = Task::new(command.args, chat_id);
    match sink.publish(&task).await {
        Ok(()) => Some(CommandReply::Accepted { task_id: task.id }),
        Err(e) => {
            error!(task_id = %task.id, error = %e, "Failed to publish task");
            Some(CommandReply::PublishFailed)
        }
    }
}

async fn handle_message(client: &TelegramClient, sink: &dyn TaskSink, message: &Message) {
    let Some(text) = message.text.as_deref() else {
        return;
    };
    let Some(reply) = handle_command(text, message.chat.id, sink).await else {
        return;
    };
    if let Err(e) = client
        .send_message(message.chat.id, &reply.text(), Some(message.message_id))
        .await
    {
        warn!(chat_id = message.chat.id, error = %e, "Failed to reply to command");
    }
}

/// Long-polls Telegram for commands forever.
pub async fn run_command_loop(client: &TelegramClient, sink: &dyn TaskSink) {
    let mut offset = 0;
    info!("Command loop started");
    loop {
        let updates = match client.get_updates(offset, POLL_TIMEOUT).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "Failed to poll updates");
                tokio::time::sleep(POLL_ERROR_PAUSE).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            if let Some(message) = &update.message {
                handle_message(client, sink, message).await;
            }
        }
    }
}
