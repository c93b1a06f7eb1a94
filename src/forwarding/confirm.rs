use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::debug;

use crate::store::{Mode, Target};

const SEND_PREFIX: &str = "send_to_";
const SEND_ALL: &str = "send_to_all";
/// Marks a channel handle after `send_to_`, so a handle named `all` (or one
/// that looks numeric) never decodes as something else.
const CHANNEL_MARK: char = '#';
const SET_AUTO: &str = "set_auto";
const SET_MANUAL: &str = "set_manual";
const DISCARD: &str = "discard_pending";

/// Telegram rejects callback data longer than this.
const MAX_CALLBACK_DATA: usize = 64;

/// Which targets a confirmation addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    All,
    One(Target),
}

/// A decoded inline-button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Send(Selector),
    SetMode(Mode),
    Discard,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            SEND_ALL => Some(CallbackAction::Send(Selector::All)),
            SET_AUTO => Some(CallbackAction::SetMode(Mode::Auto)),
            SET_MANUAL => Some(CallbackAction::SetMode(Mode::Manual)),
            DISCARD => Some(CallbackAction::Discard),
            _ => {
                let raw = data.strip_prefix(SEND_PREFIX)?;
                let target = match raw.strip_prefix(CHANNEL_MARK) {
                    Some(name) if !name.is_empty() && !name.contains(char::is_whitespace) => {
                        Target::Channel(name.to_string())
                    }
                    Some(_) => return None,
                    None => Target::Chat(raw.parse().ok()?),
                };
                Some(CallbackAction::Send(Selector::One(target)))
            }
        }
    }

    pub fn encode(&self) -> String {
        match self {
            CallbackAction::Send(Selector::All) => SEND_ALL.to_string(),
            CallbackAction::Send(Selector::One(Target::Chat(id))) => format!("{SEND_PREFIX}{id}"),
            CallbackAction::Send(Selector::One(Target::Channel(name))) => {
                format!("{SEND_PREFIX}{CHANNEL_MARK}{name}")
            }
            CallbackAction::SetMode(Mode::Auto) => SET_AUTO.to_string(),
            CallbackAction::SetMode(Mode::Manual) => SET_MANUAL.to_string(),
            CallbackAction::Discard => DISCARD.to_string(),
        }
    }
}

fn button(label: impl Into<String>, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(label, action.encode())
}

/// Prompt attached to a staged message: "Send to all", optionally one button
/// per target, and "Discard".
pub fn confirmation_keyboard(targets: &[Target], per_target: bool) -> InlineKeyboardMarkup {
    let mut rows = vec![vec![button(
        "📤 Send to all",
        CallbackAction::Send(Selector::All),
    )]];

    if per_target {
        for target in targets {
            let action = CallbackAction::Send(Selector::One(target.clone()));
            if action.encode().len() > MAX_CALLBACK_DATA {
                debug!("Target {} too long for a button, skipping", target);
                continue;
            }
            rows.push(vec![button(format!("➡️ {}", target), action)]);
        }
    }

    rows.push(vec![button("🗑 Discard", CallbackAction::Discard)]);
    InlineKeyboardMarkup::new(rows)
}

/// Auto/Manual chooser with the active mode ticked.
pub fn mode_keyboard(current: Mode) -> InlineKeyboardMarkup {
    let label = |mode: Mode, text: &str| {
        if mode == current {
            format!("✅ {}", text)
        } else {
            text.to_string()
        }
    };
    InlineKeyboardMarkup::new(vec![
        vec![button(
            label(Mode::Auto, "📤 Automatic"),
            CallbackAction::SetMode(Mode::Auto),
        )],
        vec![button(
            label(Mode::Manual, "🕹 Manual"),
            CallbackAction::SetMode(Mode::Manual),
        )],
    ])
}
