use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use teloxide::error_handlers::ErrorHandler;
use teloxide::prelude::*;
use teloxide::types::{
    InputFile, MessageEntity, MessageId, Recipient, ReplyParameters,
};
use teloxide::update_listeners::Polling;
use teloxide::utils::command::BotCommands;
use teloxide::{ApiError, RequestError};
use tracing::{debug, error, info, warn};

use crate::config::PollingConfig;
use crate::forwarding::commands::Command;
use crate::forwarding::confirm::CallbackAction;
use crate::forwarding::content::{Media, StagedMessage};
use crate::forwarding::{Forwarder, Inbound, Reply};
use crate::platform::ChatClient;
use crate::store::Target;

/// `ChatClient` backed by the Telegram Bot API.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn recipient(target: &Target) -> Recipient {
    match target {
        Target::Chat(id) => Recipient::Id(ChatId(*id)),
        Target::Channel(name) if name.starts_with('@') => Recipient::ChannelUsername(name.clone()),
        Target::Channel(name) => Recipient::ChannelUsername(format!("@{}", name)),
    }
}

#[async_trait]
impl ChatClient for TelegramClient {
    async fn send_text(&self, to: &Target, text: &str, entities: &[MessageEntity]) -> Result<()> {
        let mut req = self.bot.send_message(recipient(to), text);
        if !entities.is_empty() {
            req = req.entities(entities.to_vec());
        }
        req.await?;
        Ok(())
    }

    async fn send_photo(&self, to: &Target, media: &Media) -> Result<()> {
        let mut req = self
            .bot
            .send_photo(recipient(to), InputFile::file_id(media.file_id.clone()));
        if let Some(caption) = &media.caption {
            req = req.caption(caption.clone());
        }
        if !media.caption_entities.is_empty() {
            req = req.caption_entities(media.caption_entities.clone());
        }
        req.await?;
        Ok(())
    }

    async fn send_video(&self, to: &Target, media: &Media) -> Result<()> {
        let mut req = self
            .bot
            .send_video(recipient(to), InputFile::file_id(media.file_id.clone()));
        if let Some(caption) = &media.caption {
            req = req.caption(caption.clone());
        }
        if !media.caption_entities.is_empty() {
            req = req.caption_entities(media.caption_entities.clone());
        }
        req.await?;
        Ok(())
    }

    async fn send_document(&self, to: &Target, media: &Media) -> Result<()> {
        let mut req = self
            .bot
            .send_document(recipient(to), InputFile::file_id(media.file_id.clone()));
        if let Some(caption) = &media.caption {
            req = req.caption(caption.clone());
        }
        if !media.caption_entities.is_empty() {
            req = req.caption_entities(media.caption_entities.clone());
        }
        req.await?;
        Ok(())
    }

    async fn send_audio(&self, to: &Target, media: &Media) -> Result<()> {
        let mut req = self
            .bot
            .send_audio(recipient(to), InputFile::file_id(media.file_id.clone()));
        if let Some(caption) = &media.caption {
            req = req.caption(caption.clone());
        }
        if !media.caption_entities.is_empty() {
            req = req.caption_entities(media.caption_entities.clone());
        }
        req.await?;
        Ok(())
    }

    async fn copy_message(&self, to: &Target, from_chat: i64, message_id: i32) -> Result<()> {
        self.bot
            .copy_message(recipient(to), ChatId(from_chat), MessageId(message_id))
            .await?;
        Ok(())
    }
}

/// Listener error handler: when another process polls with the same token,
/// wait with capped exponential backoff instead of hammering the API.
struct ConflictBackoff {
    initial: Duration,
    max: Duration,
    state: Mutex<BackoffState>,
}

#[derive(Default)]
struct BackoffState {
    streak: u32,
    last: Option<Instant>,
}

impl ConflictBackoff {
    fn new(config: &PollingConfig) -> Self {
        Self {
            initial: config.backoff_initial(),
            max: config.backoff_max(),
            state: Mutex::new(BackoffState::default()),
        }
    }

    fn next_delay(&self) -> Duration {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // A quiet period longer than two max delays starts a fresh streak.
        if state
            .last
            .is_some_and(|last| last.elapsed() > self.max.saturating_mul(2))
        {
            state.streak = 0;
        }
        let delay = backoff_delay(state.streak, self.initial, self.max);
        state.streak = state.streak.saturating_add(1);
        state.last = Some(Instant::now());
        delay
    }
}

fn backoff_delay(streak: u32, initial: Duration, max: Duration) -> Duration {
    initial
        .saturating_mul(2u32.saturating_pow(streak))
        .min(max)
}

impl ErrorHandler<RequestError> for ConflictBackoff {
    fn handle_error(self: Arc<Self>, error: RequestError) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if matches!(
                error,
                RequestError::Api(ApiError::TerminatedByOtherGetUpdates)
            ) {
                let delay = self.next_delay();
                warn!(
                    "Another instance is polling with this bot token; retrying in {}s",
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
            } else {
                error!("Polling error: {}", error);
            }
        })
    }
}

/// Run the Telegram bot until Ctrl-C.
pub async fn run(forwarder: Arc<Forwarder>, bot: Bot, polling: &PollingConfig) -> Result<()> {
    let me = bot
        .get_me()
        .await
        .context("Telegram rejected the bot token (getMe failed)")?;
    info!("Authorized as @{}", me.username());

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register the command menu: {}", e);
    }

    info!("Starting Telegram platform...");

    let gate = forwarder.clone();
    let message_handler = Update::filter_message()
        .filter_map(move |msg: Message| {
            let user = msg.from.as_ref()?;
            if gate.is_admin(user.id) {
                Some(msg)
            } else {
                None
            }
        })
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(
            dptree::filter(|msg: Message| msg.text().is_some_and(|t| t.starts_with('/')))
                .endpoint(handle_unknown_command),
        )
        .branch(dptree::endpoint(handle_payload));

    let gate = forwarder.clone();
    let callback_handler = Update::filter_callback_query()
        .filter(move |q: CallbackQuery| gate.is_admin(q.from.id))
        .endpoint(handle_callback);

    let handler = dptree::entry()
        .branch(message_handler)
        .branch(callback_handler);

    let listener = Polling::builder(bot.clone()).build();
    let listener_errors = Arc::new(ConflictBackoff::new(polling));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![forwarder])
        .default_handler(|upd| async move {
            debug!("Ignored update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch_with_listener(listener, listener_errors)
        .await;

    info!("Telegram platform stopped");
    Ok(())
}

async fn send_reply(
    bot: &Bot,
    chat: ChatId,
    reply: Reply,
    reply_to: Option<MessageId>,
) -> ResponseResult<()> {
    let mut req = bot.send_message(chat, reply.text);
    if let Some(keyboard) = reply.keyboard {
        req = req.reply_markup(keyboard);
    }
    if let Some(id) = reply_to {
        req = req.reply_parameters(ReplyParameters::new(id));
    }
    req.await?;
    Ok(())
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    forwarder: Arc<Forwarder>,
) -> ResponseResult<()> {
    let user = match msg.from.as_ref() {
        Some(user) => user,
        None => return Ok(()),
    };

    info!("Command from admin: {:?}", cmd);

    match forwarder.execute(user.id, msg.chat.id, cmd).await {
        Ok(Some(reply)) => send_reply(&bot, msg.chat.id, reply, None).await?,
        Ok(None) => {}
        Err(e) => {
            error!("Command failed: {:#}", e);
            bot.send_message(msg.chat.id, format!("⚠️ Failed: {}", e))
                .await?;
        }
    }

    Ok(())
}

async fn handle_unknown_command(bot: Bot, msg: Message) -> ResponseResult<()> {
    bot.send_message(msg.chat.id, "Unknown command. Send /help for the list.")
        .await?;
    Ok(())
}

async fn handle_payload(bot: Bot, msg: Message, forwarder: Arc<Forwarder>) -> ResponseResult<()> {
    let user = match msg.from.as_ref() {
        Some(user) => user,
        None => return Ok(()),
    };

    let staged = StagedMessage::from_message(&msg);
    info!(
        "Admin message {} ({})",
        staged.message_id,
        staged.content.label()
    );

    match forwarder.handle_inbound(user.id, staged).await {
        Ok(Inbound::Relayed(report)) => {
            send_reply(&bot, msg.chat.id, Reply::text(report.summary()), Some(msg.id)).await?;
        }
        Ok(Inbound::Staged { prompt, .. }) => {
            send_reply(&bot, msg.chat.id, prompt, Some(msg.id)).await?;
        }
        Ok(Inbound::Skipped) => {
            debug!("Message {} skipped (not forwarded)", msg.id.0);
        }
        Ok(Inbound::Ignored) => {}
        Err(e) => {
            error!("Error handling message: {:#}", e);
            bot.send_message(msg.chat.id, format!("⚠️ Failed: {}", e))
                .await?;
        }
    }

    Ok(())
}

async fn handle_callback(bot: Bot, q: CallbackQuery, forwarder: Arc<Forwarder>) -> ResponseResult<()> {
    bot.answer_callback_query(q.id.clone()).await?;

    let action = match q.data.as_deref().and_then(CallbackAction::parse) {
        Some(action) => action,
        None => {
            warn!("Unknown callback data: {:?}", q.data);
            return Ok(());
        }
    };
    debug!("Callback from admin: {:?}", action);

    let reply = match forwarder.handle_callback(q.from.id, action).await {
        Ok(Some(reply)) => reply,
        Ok(None) => return Ok(()),
        Err(e) => {
            error!("Callback failed: {:#}", e);
            Reply::text(format!("⚠️ Failed: {}", e))
        }
    };

    // Replace the prompt in place so its buttons can't be pressed twice.
    match q.message {
        Some(prompt) => {
            let mut req = bot.edit_message_text(prompt.chat().id, prompt.id(), reply.text);
            if let Some(keyboard) = reply.keyboard {
                req = req.reply_markup(keyboard);
            }
            req.await?;
        }
        None => send_reply(&bot, ChatId::from(q.from.id), reply, None).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_for_ids_and_handles() {
        assert_eq!(
            recipient(&Target::Chat(-100123)),
            Recipient::Id(ChatId(-100123))
        );
        assert_eq!(
            recipient(&Target::Channel("@news".to_string())),
            Recipient::ChannelUsername("@news".to_string())
        );
        assert_eq!(
            recipient(&Target::Channel("abc".to_string())),
            Recipient::ChannelUsername("@abc".to_string())
        );
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let initial = Duration::from_secs(5);
        let max = Duration::from_secs(120);
        let delays: Vec<u64> = (0..7)
            .map(|streak| backoff_delay(streak, initial, max).as_secs())
            .collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 80, 120, 120]);
        assert_eq!(backoff_delay(u32::MAX, initial, max), max);
    }

    #[test]
    fn test_conflict_backoff_tracks_streak() {
        let backoff = ConflictBackoff::new(&PollingConfig {
            conflict_backoff_initial_secs: 1,
            conflict_backoff_max_secs: 4,
        });
        let delays: Vec<u64> = (0..4).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 4]);
    }
}
