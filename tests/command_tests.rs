use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use shortsbot::api::parsing::is_shorts_url;
use shortsbot::api::{CommandReply, handle_command};
use shortsbot::broker::publisher::TaskSink;
use shortsbot::core::models::Task;
use shortsbot::errors::PublishError;

#[derive(Default)]
struct RecordingSink {
    published: Mutex<Vec<Task>>,
    fail: bool,
}

#[async_trait]
impl TaskSink for RecordingSink {
    async fn publish(&self, task: &Task) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError::Timeout(Duration::from_secs(5)));
        }
        self.published.lock().unwrap().push(task.clone());
        Ok(())
    }
}

#[test]
fn test_shorts_url_validation() {
    assert!(is_shorts_url("https://youtube.com/shorts/abc123"));
    assert!(is_shorts_url("https://www.youtube.com/shorts/abc123?feature=share"));
    assert!(is_shorts_url("HTTP://YOUTU.BE/abc123"));

    assert!(!is_shorts_url("https://youtube.com/watch?v=abc123"));
    assert!(!is_shorts_url("https://youtube.com/shorts/"));
    assert!(!is_shorts_url("ftp://youtu.be/abc"));
    assert!(!is_shorts_url("https://youtu.be/abc def"));
    assert!(!is_shorts_url(""));
}

#[tokio::test]
async fn test_valid_command_publishes_task() {
    let sink = RecordingSink::default();

    let reply = handle_command("/download https://youtu.be/abc", 42, &sink).await;

    let published = sink.published.lock().unwrap().clone();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].url, "https://youtu.be/abc");
    assert_eq!(published[0].chat_id, 42);
    assert_eq!(
        reply,
        Some(CommandReply::Accepted {
            task_id: published[0].id.clone()
        })
    );
}

#[tokio::test]
async fn test_invalid_url_gets_usage_reply() {
    let sink = RecordingSink::default();

    let reply = handle_command("/download https://example.com/video", 1, &sink).await;
    assert_eq!(reply, Some(CommandReply::Usage));

    let reply = handle_command("/download", 1, &sink).await;
    assert_eq!(reply, Some(CommandReply::Usage));

    assert!(sink.published.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_other_messages_are_ignored() {
    let sink = RecordingSink::default();
    assert_eq!(handle_command("hi there", 1, &sink).await, None);
    assert_eq!(handle_command("/start", 1, &sink).await, None);
}

#[tokio::test]
async fn test_publish_failure_asks_to_retry_later() {
    let sink = RecordingSink {
        fail: true,
        ..RecordingSink::default()
    };

    let reply = handle_command("/download https://youtu.be/abc", 1, &sink)
        .await
        .unwrap();

    assert_eq!(reply, CommandReply::PublishFailed);
    assert!(reply.text().contains("try again later"));
}

#[test]
fn test_accepted_reply_includes_task_id() {
    let reply = CommandReply::Accepted {
        task_id: "abc-123".into(),
    };
    assert_eq!(reply.text(), "Task accepted, id=abc-123");
}
