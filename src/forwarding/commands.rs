use anyhow::Result;
use teloxide::types::{ChatId, UserId};
use teloxide::utils::command::BotCommands;

use super::confirm::mode_keyboard;
use super::{mode_changed_text, Forwarder, Reply};
use crate::store::{AddOutcome, Mode, RemoveOutcome, Target};

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Forwarding commands:")]
pub enum Command {
    #[command(description = "show help and current status")]
    Start,
    #[command(description = "show help and current status")]
    Help,
    #[command(description = "choose the send mode: /mode [auto|manual|toggle]")]
    Mode(String),
    #[command(description = "add a destination chat id or channel (no argument: this chat)")]
    AddTarget(String),
    #[command(description = "remove a destination chat id or channel")]
    RemoveTarget(String),
    #[command(description = "list destinations")]
    Targets,
    #[command(description = "discard the message waiting for confirmation")]
    Cancel,
}

impl Forwarder {
    /// Run an admin command sent in `chat`. Returns `None` for anyone but the
    /// admin, without touching any state.
    pub async fn execute(
        &self,
        sender: UserId,
        chat: ChatId,
        command: Command,
    ) -> Result<Option<Reply>> {
        if !self.is_admin(sender) {
            return Ok(None);
        }

        let reply = match command {
            Command::Start | Command::Help => Reply::text(self.help_text().await),
            Command::Mode(arg) => self.mode_command(arg.trim()).await?,
            Command::AddTarget(arg) => {
                let target = match resolve_target(&arg, chat) {
                    Ok(target) => target,
                    Err(e) => return Ok(Some(invalid_target(&e))),
                };
                match self.store.add_target(target.clone()).await? {
                    AddOutcome::Added => Reply::text(format!("✅ Added {}.", target)),
                    AddOutcome::AlreadyPresent => {
                        Reply::text(format!("ℹ️ {} is already a target.", target))
                    }
                }
            }
            Command::RemoveTarget(arg) => {
                let target = match Target::parse(&arg) {
                    Ok(target) => target,
                    Err(e) => return Ok(Some(invalid_target(&e))),
                };
                match self.store.remove_target(&target).await? {
                    RemoveOutcome::Removed => Reply::text(format!("🗑 Removed {}.", target)),
                    RemoveOutcome::NotFound => {
                        Reply::text(format!("ℹ️ {} is not a target.", target))
                    }
                }
            }
            Command::Targets => Reply::text(targets_text(&self.store.targets().await)),
            Command::Cancel => match self.store.take_pending().await {
                Some(_) => Reply::text("🗑 Pending message discarded."),
                None => Reply::text("Nothing is waiting to be sent."),
            },
        };
        Ok(Some(reply))
    }

    async fn mode_command(&self, arg: &str) -> Result<Reply> {
        if arg.is_empty() {
            let current = self.store.mode().await;
            return Ok(Reply::with_keyboard(
                format!("Current mode: {}. Choose how messages are sent:", current),
                mode_keyboard(current),
            ));
        }
        if arg.eq_ignore_ascii_case("toggle") {
            let mode = self.store.toggle_mode().await?;
            return Ok(Reply::text(mode_changed_text(mode)));
        }
        match arg.parse::<Mode>() {
            Ok(mode) => {
                self.store.set_mode(mode).await?;
                Ok(Reply::text(mode_changed_text(mode)))
            }
            Err(e) => Ok(Reply::text(format!("⚠️ {}", e))),
        }
    }

    async fn help_text(&self) -> String {
        let status = self.status().await;
        format!(
            "I relay your messages to the configured targets.\n\n{}\n\n\
             Mode: {}\nTargets: {}\nPending message: {}",
            Command::descriptions(),
            status.mode,
            status.targets,
            if status.pending { "yes" } else { "no" }
        )
    }
}

/// An empty argument means "the chat this command was sent in".
fn resolve_target(arg: &str, chat: ChatId) -> Result<Target> {
    if arg.trim().is_empty() {
        Ok(Target::Chat(chat.0))
    } else {
        Target::parse(arg)
    }
}

fn invalid_target(error: &anyhow::Error) -> Reply {
    Reply::text(format!(
        "⚠️ Invalid target: {}. Use a numeric chat id or a channel name like @mychannel.",
        error
    ))
}

fn targets_text(targets: &[Target]) -> String {
    if targets.is_empty() {
        return "No targets yet. Add one with /addtarget <id>.".to_string();
    }
    let mut out = format!("Targets ({}):\n", targets.len());
    for (i, target) in targets.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, target));
    }
    out
}
