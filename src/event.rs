//! Inbound event model.
//!
//! Commands and callback keys are closed enums with an explicit `Unknown`
//! fallback, so dispatch never works with free-form action strings.

use crate::deliver::MessageHandle;
use chrono::{DateTime, Utc};

/// Slash commands understood by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Begin (or replay) the onboarding sequence.
    Start,
    /// Show usage help.
    Help,
    /// Show bot information.
    About,
    /// Show runtime statistics.
    Stats,
    /// Show the current bot settings.
    Settings,
    /// Cancel a running onboarding session.
    Cancel,
    /// Any other `/command`; answered with a graceful "not found".
    Unknown(String),
}

impl Command {
    /// Parses the leading token of a message text (`/start`, `/help@SomeBot`).
    ///
    /// Returns `None` when the text is not a command at all.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        Some(match name.to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "about" => Self::About,
            "stats" => Self::Stats,
            "settings" => Self::Settings,
            "cancel" => Self::Cancel,
            other => Self::Unknown(other.to_string()),
        })
    }
}

/// Sections of the main menu reachable from the inline keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuSection {
    /// Task management.
    Tasks,
    /// Reminders and alerts.
    Alerts,
    /// User statistics.
    Stats,
    /// Small utility tools.
    Tools,
    /// Help text.
    Help,
    /// About text.
    About,
}

/// Callback-button keys decoded from payloads such as `menu:tasks`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackKey {
    /// Open a main-menu section.
    Menu(MenuSection),
    /// Return to the main menu.
    BackToMenu,
    /// Unrecognized payload; answered gracefully.
    Unknown(String),
}

impl CallbackKey {
    /// Encodes the key back into its wire payload, the exact string
    /// [`Self::parse`] accepts. Used when rendering keyboard buttons.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::BackToMenu => "back:menu".to_string(),
            Self::Menu(MenuSection::Tasks) => "menu:tasks".to_string(),
            Self::Menu(MenuSection::Alerts) => "menu:alerts".to_string(),
            Self::Menu(MenuSection::Stats) => "menu:stats".to_string(),
            Self::Menu(MenuSection::Tools) => "menu:tools".to_string(),
            Self::Menu(MenuSection::Help) => "menu:help".to_string(),
            Self::Menu(MenuSection::About) => "menu:about".to_string(),
            Self::Unknown(data) => data.clone(),
        }
    }

    /// Decodes a raw callback payload.
    #[must_use]
    pub fn parse(data: &str) -> Self {
        match data {
            "back:menu" => Self::BackToMenu,
            "menu:tasks" => Self::Menu(MenuSection::Tasks),
            "menu:alerts" => Self::Menu(MenuSection::Alerts),
            "menu:stats" => Self::Menu(MenuSection::Stats),
            "menu:tools" => Self::Menu(MenuSection::Tools),
            "menu:help" => Self::Menu(MenuSection::Help),
            "menu:about" => Self::Menu(MenuSection::About),
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Kind of inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A slash command from a chat message.
    Command(Command),
    /// An inline-keyboard button tap.
    Callback(CallbackKey),
}

impl EventKind {
    /// Short label for log lines.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Command(Command::Start) => "command:start",
            Self::Command(Command::Help) => "command:help",
            Self::Command(Command::About) => "command:about",
            Self::Command(Command::Stats) => "command:stats",
            Self::Command(Command::Settings) => "command:settings",
            Self::Command(Command::Cancel) => "command:cancel",
            Self::Command(Command::Unknown(_)) => "command:unknown",
            Self::Callback(CallbackKey::Menu(_)) => "callback:menu",
            Self::Callback(CallbackKey::BackToMenu) => "callback:back",
            Self::Callback(CallbackKey::Unknown(_)) => "callback:unknown",
        }
    }
}

/// One inbound platform event.
///
/// Delivered at-least-once and unordered across identities; duplicates are
/// possible and tolerated (fixed-window limiting plus no-op-on-unknown-session
/// make redelivery harmless).
#[derive(Debug, Clone)]
pub struct Event {
    /// Stable user/chat identifier.
    pub identity: i64,
    /// Display name used for personalization.
    pub first_name: String,
    /// What happened.
    pub kind: EventKind,
    /// For callbacks: handle of the message the tapped keyboard hangs off,
    /// so the reply can edit it in place.
    pub origin: Option<MessageHandle>,
    /// Wall-clock receive time.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Convenience constructor for a command event.
    #[must_use]
    pub fn command(identity: i64, first_name: &str, command: Command) -> Self {
        Self {
            identity,
            first_name: first_name.to_string(),
            kind: EventKind::Command(command),
            origin: None,
            timestamp: Utc::now(),
        }
    }

    /// Convenience constructor for a callback event.
    #[must_use]
    pub fn callback(identity: i64, key: CallbackKey, origin: Option<MessageHandle>) -> Self {
        Self {
            identity,
            first_name: String::new(),
            kind: EventKind::Callback(key),
            origin,
            timestamp: Utc::now(),
        }
    }
}
