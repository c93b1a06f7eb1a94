pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::types::MessageEntity;

use crate::forwarding::content::Media;
use crate::store::Target;

/// Outbound side of the chat platform: one primitive per content category.
///
/// Implementations report failures as errors; the caller decides whether a
/// failure aborts anything (relay never does).
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn send_text(&self, to: &Target, text: &str, entities: &[MessageEntity]) -> Result<()>;

    async fn send_photo(&self, to: &Target, media: &Media) -> Result<()>;

    async fn send_video(&self, to: &Target, media: &Media) -> Result<()>;

    async fn send_document(&self, to: &Target, media: &Media) -> Result<()>;

    async fn send_audio(&self, to: &Target, media: &Media) -> Result<()>;

    /// Re-post an existing message without the "forwarded from" header.
    async fn copy_message(&self, to: &Target, from_chat: i64, message_id: i32) -> Result<()>;
}
