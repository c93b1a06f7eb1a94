pub mod commands;
pub mod confirm;
pub mod content;
pub mod relay;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::{InlineKeyboardMarkup, UserId};
use tracing::{debug, info};

use crate::config::ForwardingConfig;
use crate::platform::ChatClient;
use crate::store::{Mode, StateStore, Target};

use self::confirm::{confirmation_keyboard, CallbackAction, Selector};
use self::content::StagedMessage;
use self::relay::{relay, RelayReport};

#[derive(Debug, Clone)]
pub struct ForwardingSettings {
    pub send_timeout: Duration,
    pub per_target_buttons: bool,
    pub forwarded_only: bool,
}

impl From<&ForwardingConfig> for ForwardingSettings {
    fn from(config: &ForwardingConfig) -> Self {
        Self {
            send_timeout: config.send_timeout(),
            per_target_buttons: config.per_target_buttons,
            forwarded_only: config.forwarded_only,
        }
    }
}

/// Text (and optional buttons) to show the admin.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<InlineKeyboardMarkup>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: InlineKeyboardMarkup) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }
}

/// What happened to an incoming admin message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Sender is not the admin; nothing was done.
    Ignored,
    /// Not a forwarded message while `forwarded_only` is on.
    Skipped,
    Relayed(RelayReport),
    Staged { replaced: bool, prompt: Reply },
}

/// Result of pressing a send button.
#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    Ignored,
    NothingPending,
    /// The chosen target was removed after the prompt was shown. The pending
    /// message is kept.
    TargetGone(Target),
    Relayed(RelayReport),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub mode: Mode,
    pub targets: usize,
    pub pending: bool,
}

/// Owns the bot's state and decides, per admin message, whether to relay now
/// or wait for confirmation.
pub struct Forwarder {
    client: Arc<dyn ChatClient>,
    store: StateStore,
    admin: UserId,
    settings: ForwardingSettings,
}

impl Forwarder {
    pub fn new(
        client: Arc<dyn ChatClient>,
        store: StateStore,
        admin: UserId,
        settings: ForwardingSettings,
    ) -> Self {
        Self {
            client,
            store,
            admin,
            settings,
        }
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        user == self.admin
    }

    #[cfg(test)]
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub async fn status(&self) -> Status {
        Status {
            mode: self.store.mode().await,
            targets: self.store.targets().await.len(),
            pending: self.store.pending().await.is_some(),
        }
    }

    pub async fn handle_inbound(&self, sender: UserId, message: StagedMessage) -> Result<Inbound> {
        if !self.is_admin(sender) {
            return Ok(Inbound::Ignored);
        }
        if self.settings.forwarded_only && !message.forwarded {
            debug!("Skipping non-forwarded message {}", message.message_id);
            return Ok(Inbound::Skipped);
        }

        match self.store.mode().await {
            Mode::Auto => {
                let targets = self.store.targets().await;
                let report = relay(
                    self.client.as_ref(),
                    &message,
                    &targets,
                    self.settings.send_timeout,
                )
                .await;
                Ok(Inbound::Relayed(report))
            }
            Mode::Manual => {
                let label = message.content.label();
                let replaced = self.store.set_pending(message).await?;
                info!("Staged {} for confirmation (replaced={})", label, replaced);

                let targets = self.store.targets().await;
                let mut text = format!(
                    "Press a button to send this {} to {} target(s).",
                    label,
                    targets.len()
                );
                if replaced {
                    text.push_str("\nThe previous unsent message was replaced.");
                }
                let prompt = Reply::with_keyboard(
                    text,
                    confirmation_keyboard(&targets, self.settings.per_target_buttons),
                );
                Ok(Inbound::Staged { replaced, prompt })
            }
        }
    }

    /// Relay the pending message to the selected targets, read from the
    /// store at this moment. The pending slot is consumed exactly once.
    pub async fn confirm_send(&self, sender: UserId, selector: Selector) -> Confirmation {
        if !self.is_admin(sender) {
            return Confirmation::Ignored;
        }

        if let Selector::One(target) = &selector {
            if !self.store.contains(target).await {
                return Confirmation::TargetGone(target.clone());
            }
        }

        let Some(message) = self.store.take_pending().await else {
            return Confirmation::NothingPending;
        };

        let targets = match selector {
            Selector::All => self.store.targets().await,
            Selector::One(target) => vec![target],
        };
        let report = relay(
            self.client.as_ref(),
            &message,
            &targets,
            self.settings.send_timeout,
        )
        .await;
        Confirmation::Relayed(report)
    }

    /// Handle an inline-button press. `None` means the press is ignored.
    pub async fn handle_callback(
        &self,
        sender: UserId,
        action: CallbackAction,
    ) -> Result<Option<Reply>> {
        if !self.is_admin(sender) {
            return Ok(None);
        }

        let reply = match action {
            CallbackAction::SetMode(mode) => {
                self.store.set_mode(mode).await?;
                Reply::text(mode_changed_text(mode))
            }
            CallbackAction::Discard => match self.store.take_pending().await {
                Some(_) => Reply::text("🗑 Pending message discarded."),
                None => Reply::text("Nothing to discard."),
            },
            CallbackAction::Send(selector) => match self.confirm_send(sender, selector).await {
                Confirmation::Ignored => return Ok(None),
                Confirmation::NothingPending => {
                    Reply::text("⚠️ No message is waiting to be sent.")
                }
                Confirmation::TargetGone(target) => {
                    let targets = self.store.targets().await;
                    Reply::with_keyboard(
                        format!("⚠️ {} is no longer a target. Pick again:", target),
                        confirmation_keyboard(&targets, self.settings.per_target_buttons),
                    )
                }
                Confirmation::Relayed(report) => Reply::text(report.summary()),
            },
        };
        Ok(Some(reply))
    }
}

pub(crate) fn mode_changed_text(mode: Mode) -> &'static str {
    match mode {
        Mode::Auto => "✅ Automatic sending enabled.",
        Mode::Manual => "🕹 Manual sending enabled: each message waits for a button press.",
    }
}
