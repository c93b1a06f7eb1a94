use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use teloxide::types::{FileId, FileMeta, Message, MessageEntity};

/// A file already stored on Telegram's side, with its caption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub file_id: FileId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caption_entities: Vec<MessageEntity>,
}

/// What an admin message carries, by the send primitive it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Content {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        entities: Vec<MessageEntity>,
    },
    Photo(Media),
    Video(Media),
    Document(Media),
    Audio(Media),
    /// Anything else (stickers, voice, polls, albums...) is copied as-is
    /// from the origin chat.
    Other,
}

impl Content {
    pub fn label(&self) -> &'static str {
        match self {
            Content::Text { .. } => "text",
            Content::Photo(_) => "photo",
            Content::Video(_) => "video",
            Content::Document(_) => "document",
            Content::Audio(_) => "audio",
            Content::Other => "message",
        }
    }
}

/// A message received from the admin, ready to be relayed now or later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedMessage {
    pub origin_chat: i64,
    pub message_id: i32,
    /// The admin forwarded this message to the bot rather than writing it.
    #[serde(default)]
    pub forwarded: bool,
    pub staged_at: DateTime<Utc>,
    pub content: Content,
}

impl StagedMessage {
    pub fn from_message(msg: &Message) -> Self {
        Self {
            origin_chat: msg.chat.id.0,
            message_id: msg.id.0,
            forwarded: msg.forward_origin().is_some(),
            staged_at: Utc::now(),
            content: extract_content(msg),
        }
    }
}

fn extract_content(msg: &Message) -> Content {
    if let Some(text) = msg.text() {
        return Content::Text {
            text: text.to_string(),
            entities: msg.entities().map(<[_]>::to_vec).unwrap_or_default(),
        };
    }
    // Telegram lists photo sizes smallest first.
    if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        return Content::Photo(media(&photo.file, msg));
    }
    if let Some(video) = msg.video() {
        return Content::Video(media(&video.file, msg));
    }
    if let Some(document) = msg.document() {
        return Content::Document(media(&document.file, msg));
    }
    if let Some(audio) = msg.audio() {
        return Content::Audio(media(&audio.file, msg));
    }
    Content::Other
}

fn media(file: &FileMeta, msg: &Message) -> Media {
    Media {
        file_id: file.id.clone(),
        caption: msg.caption().map(str::to_string),
        caption_entities: msg
            .caption_entities()
            .map(<[_]>::to_vec)
            .unwrap_or_default(),
    }
}
