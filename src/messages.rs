//! Static message templates.
//!
//! All user-visible prose lives here. Templates interpolating user-supplied
//! text escape it for Telegram HTML with `html-escape`.

use crate::deliver::{Action, Keyboard};
use crate::event::{CallbackKey, MenuSection};
use html_escape::encode_text;

/// First-tier throttle notice.
pub const SLOW_DOWN: &str =
    "⚠️ <b>Slow down!</b>\n\nYou're sending requests too quickly. Please wait a moment before trying again.";

/// Escalated throttle notice for repeat offenders.
pub const RESTRICTED: &str =
    "⛔ <b>Rate limit exceeded!</b>\n\nYou've been temporarily restricted. Please wait a minute before continuing.";

/// Generic contained-fault notice.
pub const GENERIC_ERROR: &str =
    "❌ Sorry, something went wrong. Please try again later.\nIf the problem persists, contact support.";

/// Reply to `/cancel` with a live onboarding session.
pub const CANCELLED: &str = "❌ Operation cancelled.\n\nUse /start to return to the main menu.";

/// Reply to `/cancel` with nothing to cancel.
pub const NOTHING_TO_CANCEL: &str = "Nothing to cancel. Use /start to begin.";

/// Reply to an unrecognized callback button.
pub const UNKNOWN_ACTION: &str = "🔄 Feature coming soon!";

/// Final welcome message with personalization.
#[must_use]
pub fn welcome(first_name: &str) -> String {
    let name = if first_name.trim().is_empty() {
        "Friend".to_string()
    } else {
        encode_text(first_name).into_owned()
    };
    format!(
        "👋 Welcome, <b>{name}</b>!\n\n\
         I'm your utility assistant. Here's what I can do:\n\n\
         • 📝 Tasks — track what needs doing\n\
         • ⏰ Alerts — reminders at the right time\n\
         • 📊 Stats — your progress at a glance\n\
         • 🔧 Tools — small helpers for daily work\n\n\
         Pick a section from the menu, or type /help."
    )
}

/// Default progressive-reveal stage texts.
#[must_use]
pub fn default_stages() -> Vec<String> {
    [
        "🤖 Initializing...",
        "🤖 Initializing... ✅",
        "🔧 Loading features...",
        "🔧 Loading features... ✅",
        "🚀 Preparing your workspace...",
        "✨ Almost ready...",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

/// Main-menu keyboard: a 2x3 grid of section buttons.
#[must_use]
pub fn main_menu_keyboard() -> Keyboard {
    vec![
        vec![
            Action::new("📋 Tasks", CallbackKey::Menu(MenuSection::Tasks)),
            Action::new("🔔 Alerts", CallbackKey::Menu(MenuSection::Alerts)),
        ],
        vec![
            Action::new("📊 Stats", CallbackKey::Menu(MenuSection::Stats)),
            Action::new("🛠️ Tools", CallbackKey::Menu(MenuSection::Tools)),
        ],
        vec![
            Action::new("❓ Help", CallbackKey::Menu(MenuSection::Help)),
            Action::new("ℹ️ About", CallbackKey::Menu(MenuSection::About)),
        ],
    ]
}

/// Single back-row keyboard attached under section views.
#[must_use]
pub fn back_keyboard() -> Keyboard {
    vec![vec![Action::new(
        "◀️ Back to Main Menu",
        CallbackKey::BackToMenu,
    )]]
}

/// Body of the `/settings` reply, rendering the live configuration.
#[must_use]
pub fn settings(enable_animations: bool, limit: u32, window_secs: u64) -> String {
    let animations = if enable_animations { "on" } else { "off" };
    format!(
        "⚙️ <b>Settings</b>\n\n\
         • 🎬 Start animation: {animations}\n\
         • 🚦 Rate limit: {limit} requests per {window_secs}s\n\n\
         Settings are managed by the bot operator."
    )
}

/// Body of the `/help` reply.
#[must_use]
pub fn help() -> String {
    "❓ <b>Help</b>\n\n\
     /start — show the main menu\n\
     /help — this text\n\
     /about — about this bot\n\
     /stats — runtime statistics\n\
     /settings — current bot settings\n\
     /cancel — cancel the current operation"
        .to_string()
}

/// Body of the `/about` reply.
#[must_use]
pub fn about() -> String {
    "ℹ️ <b>Utility Bot</b>\n\n\
     A small assistant for tasks, alerts and everyday tools.\n\
     Built with Rust and teloxide."
        .to_string()
}

/// Reply to an unknown slash command.
#[must_use]
pub fn not_found(command: &str) -> String {
    format!(
        "🤔 Unknown command: <code>/{}</code>\n\nTry /help for the list of commands.",
        encode_text(command)
    )
}

/// Runtime counters rendered by the `/stats` template.
#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    /// Seconds since startup.
    pub uptime_secs: u64,
    /// Identities with a tracked rate window.
    pub tracked_identities: usize,
    /// Total rate-limit denials.
    pub denied_total: u64,
    /// Live cache entries.
    pub cache_entries: usize,
    /// Onboarding sessions currently animating.
    pub active_sessions: usize,
}

/// Renders `/stats`. Admins get the full counter set, everyone else the
/// public subset.
#[must_use]
pub fn stats(snapshot: &StatsSnapshot, detailed: bool) -> String {
    let mut text = format!(
        "📊 <b>Bot statistics</b>\n\n• Uptime: {}s\n",
        snapshot.uptime_secs
    );
    if detailed {
        text.push_str(&format!(
            "• Tracked users: {}\n• Throttled requests: {}\n• Cached messages: {}\n• Active onboardings: {}\n",
            snapshot.tracked_identities,
            snapshot.denied_total,
            snapshot.cache_entries,
            snapshot.active_sessions,
        ));
    }
    text
}

/// Body for a main-menu section opened from the inline keyboard.
#[must_use]
pub fn menu_section(section: MenuSection) -> String {
    match section {
        MenuSection::Tasks => {
            "📝 <b>Tasks</b>\n\nCreate, view and complete your tasks here.".to_string()
        }
        MenuSection::Alerts => {
            "⏰ <b>Alerts</b>\n\nSet reminders and manage notifications.".to_string()
        }
        MenuSection::Stats => {
            "📊 <b>Your statistics</b>\n\nProgress, streaks and completion rates.".to_string()
        }
        MenuSection::Tools => {
            "🔧 <b>Tools</b>\n\nCalculator, notes, timers and more.".to_string()
        }
        MenuSection::Help => help(),
        MenuSection::About => about(),
    }
}
