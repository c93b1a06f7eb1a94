//! Recording `ChatClient` and message builders shared by the forwarding tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use teloxide::types::MessageEntity;

use crate::forwarding::content::{Content, Media, StagedMessage};
use crate::platform::ChatClient;
use crate::store::Target;

#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub to: Target,
    pub kind: &'static str,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub file_id: Option<String>,
    pub entities: usize,
    pub copied_from: Option<(i64, i32)>,
}

impl Sent {
    fn new(to: &Target, kind: &'static str) -> Self {
        Self {
            to: to.clone(),
            kind,
            text: None,
            caption: None,
            file_id: None,
            entities: 0,
            copied_from: None,
        }
    }

    fn media(to: &Target, kind: &'static str, media: &Media) -> Self {
        Self {
            caption: media.caption.clone(),
            file_id: Some(media.file_id.0.clone()),
            entities: media.caption_entities.len(),
            ..Self::new(to, kind)
        }
    }
}

#[derive(Default)]
pub struct RecordingClient {
    failing: Vec<Target>,
    hanging: Vec<Target>,
    attempts: Mutex<Vec<Target>>,
    sent: Mutex<Vec<Sent>>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(targets: &[Target]) -> Self {
        Self {
            failing: targets.to_vec(),
            ..Self::default()
        }
    }

    pub fn hanging_for(targets: &[Target]) -> Self {
        Self {
            hanging: targets.to_vec(),
            ..Self::default()
        }
    }

    /// Every target a send was attempted for, successful or not.
    pub fn attempts(&self) -> Vec<Target> {
        self.attempts.lock().unwrap().clone()
    }

    /// Successful sends only.
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    async fn deliver(&self, sent: Sent) -> Result<()> {
        self.attempts.lock().unwrap().push(sent.to.clone());
        if self.hanging.contains(&sent.to) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(&sent.to) {
            anyhow::bail!("Forbidden: bot was kicked from the chat");
        }
        self.sent.lock().unwrap().push(sent);
        Ok(())
    }
}

#[async_trait]
impl ChatClient for RecordingClient {
    async fn send_text(&self, to: &Target, text: &str, entities: &[MessageEntity]) -> Result<()> {
        self.deliver(Sent {
            text: Some(text.to_string()),
            entities: entities.len(),
            ..Sent::new(to, "text")
        })
        .await
    }

    async fn send_photo(&self, to: &Target, media: &Media) -> Result<()> {
        self.deliver(Sent::media(to, "photo", media)).await
    }

    async fn send_video(&self, to: &Target, media: &Media) -> Result<()> {
        self.deliver(Sent::media(to, "video", media)).await
    }

    async fn send_document(&self, to: &Target, media: &Media) -> Result<()> {
        self.deliver(Sent::media(to, "document", media)).await
    }

    async fn send_audio(&self, to: &Target, media: &Media) -> Result<()> {
        self.deliver(Sent::media(to, "audio", media)).await
    }

    async fn copy_message(&self, to: &Target, from_chat: i64, message_id: i32) -> Result<()> {
        self.deliver(Sent {
            copied_from: Some((from_chat, message_id)),
            ..Sent::new(to, "copy")
        })
        .await
    }
}

impl Content {
    pub fn text(text: &str) -> Self {
        Content::Text {
            text: text.to_string(),
            entities: Vec::new(),
        }
    }
}

/// An admin message from chat 42, message 7.
pub fn staged(content: Content) -> StagedMessage {
    StagedMessage {
        origin_chat: 42,
        message_id: 7,
        forwarded: false,
        staged_at: Utc::now(),
        content,
    }
}
