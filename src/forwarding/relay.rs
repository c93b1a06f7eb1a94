use anyhow::Result;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::forwarding::content::{Content, StagedMessage};
use crate::platform::ChatClient;
use crate::store::Target;

/// Outcome of one relay batch, per target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelayReport {
    pub succeeded: Vec<Target>,
    pub failed: Vec<(Target, String)>,
}

impl RelayReport {
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Short tally for the admin, one line per failure.
    pub fn summary(&self) -> String {
        if self.attempted() == 0 {
            return "No targets configured. Add one with /addtarget <id>.".to_string();
        }
        let mut out = format!(
            "Sent to {}/{} target(s).",
            self.succeeded.len(),
            self.attempted()
        );
        for (target, error) in &self.failed {
            out.push_str(&format!("\nFailed {}: {}", target, error));
        }
        out
    }
}

/// Send `message` to every target in order. A failing or stalled target is
/// recorded and skipped; the batch always runs to the end.
pub async fn relay(
    client: &dyn ChatClient,
    message: &StagedMessage,
    targets: &[Target],
    timeout: Duration,
) -> RelayReport {
    let mut report = RelayReport::default();

    for target in targets {
        debug!("Relaying {} to {}", message.content.label(), target);
        let outcome = match tokio::time::timeout(timeout, send_to(client, message, target)).await
        {
            Ok(result) => result.map_err(|e| format!("{:#}", e)),
            Err(_) => Err(format!("timed out after {}s", timeout.as_secs())),
        };

        match outcome {
            Ok(()) => report.succeeded.push(target.clone()),
            Err(error) => {
                warn!("Failed to send to {}: {}", target, error);
                report.failed.push((target.clone(), error));
            }
        }
    }

    info!(
        "Relayed {} to {}/{} target(s)",
        message.content.label(),
        report.succeeded.len(),
        report.attempted()
    );
    report
}

async fn send_to(client: &dyn ChatClient, message: &StagedMessage, target: &Target) -> Result<()> {
    match &message.content {
        Content::Text { text, entities } => client.send_text(target, text, entities).await,
        Content::Photo(media) => client.send_photo(target, media).await,
        Content::Video(media) => client.send_video(target, media).await,
        Content::Document(media) => client.send_document(target, media).await,
        Content::Audio(media) => client.send_audio(target, media).await,
        Content::Other => {
            client
                .copy_message(target, message.origin_chat, message.message_id)
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarding::content::Media;
    use crate::forwarding::testing::{staged, RecordingClient};
    use teloxide::types::{FileId, MessageEntity};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_failure_does_not_abort_batch() {
        let client = RecordingClient::failing_for(&[Target::Chat(222)]);
        let targets = [Target::Chat(111), Target::Chat(222), Target::Chat(333)];

        let report = relay(&client, &staged(Content::text("hello")), &targets, TIMEOUT).await;

        assert_eq!(report.succeeded, vec![Target::Chat(111), Target::Chat(333)]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, Target::Chat(222));
        assert!(report.failed[0].1.contains("bot was kicked"));
        assert_eq!(
            client.attempts(),
            vec![Target::Chat(111), Target::Chat(222), Target::Chat(333)]
        );
    }

    #[tokio::test]
    async fn test_dispatches_by_content_category() {
        let client = RecordingClient::new();
        let to = [Target::Channel("@news".to_string())];
        let media = Media {
            file_id: FileId("file-1".to_string()),
            caption: Some("cap".to_string()),
            caption_entities: Vec::new(),
        };

        for content in [
            Content::Photo(media.clone()),
            Content::Video(media.clone()),
            Content::Document(media.clone()),
            Content::Audio(media.clone()),
            Content::Other,
        ] {
            relay(&client, &staged(content), &to, TIMEOUT).await;
        }

        let kinds: Vec<&str> = client.sent().iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec!["photo", "video", "document", "audio", "copy"]);
        assert_eq!(client.sent()[0].caption.as_deref(), Some("cap"));
        assert_eq!(client.sent()[4].copied_from, Some((42, 7)));
    }

    #[tokio::test]
    async fn test_stalled_target_times_out() {
        let client = RecordingClient::hanging_for(&[Target::Chat(1)]);
        let targets = [Target::Chat(1), Target::Chat(2)];

        let report = relay(
            &client,
            &staged(Content::text("hi")),
            &targets,
            Duration::from_millis(50),
        )
        .await;

        assert_eq!(report.succeeded, vec![Target::Chat(2)]);
        assert!(report.failed[0].1.contains("timed out"));
    }

    #[test]
    fn test_summary_lists_failures() {
        let report = RelayReport {
            succeeded: vec![Target::Chat(1)],
            failed: vec![(Target::Chat(2), "Forbidden".to_string())],
        };
        assert_eq!(report.summary(), "Sent to 1/2 target(s).\nFailed 2: Forbidden");
        assert!(RelayReport::default().summary().contains("No targets"));
    }

    #[tokio::test]
    async fn test_text_keeps_entities() {
        let client = RecordingClient::new();
        let content = Content::Text {
            text: "hello world".to_string(),
            entities: vec![MessageEntity::bold(0, 5)],
        };

        relay(&client, &staged(content), &[Target::Chat(5)], TIMEOUT).await;

        let sent = client.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, "text");
        assert_eq!(sent[0].text.as_deref(), Some("hello world"));
        assert_eq!(sent[0].entities, 1);
    }
}
