//! Telegram transport adapter.
//!
//! Maps teloxide updates onto core [`Event`]s and implements the
//! [`Deliverer`] contract against the Bot API, with automatic retry on
//! transient failures (exponential backoff with jitter) and graceful
//! degradation for edits of vanished or unchanged messages.

use crate::deliver::{Deliverer, Keyboard, MessageHandle};
use crate::dispatch::Dispatcher;
use crate::error::BotError;
use crate::event::{CallbackKey, Command, Event, EventKind};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQuery, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, Message, MessageId,
    ParseMode, User,
};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{debug, warn};

/// Initial backoff for Telegram API retries, milliseconds.
const API_INITIAL_BACKOFF_MS: u64 = 250;
/// Backoff ceiling, milliseconds.
const API_MAX_BACKOFF_MS: u64 = 4_000;
/// Retry attempts before giving up.
const API_MAX_RETRIES: usize = 3;

const ERROR_NOT_MODIFIED: &str = "message is not modified";
const ERROR_NOT_FOUND: &str = "message to edit not found";

/// Retries a Telegram API operation with exponential backoff and jitter.
async fn retry_api_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let strategy = ExponentialBackoff::from_millis(API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(API_MAX_RETRIES);

    Retry::spawn(strategy, operation).await.map_err(|e| {
        warn!(
            "Telegram API operation failed after {} attempts: {}",
            API_MAX_RETRIES, e
        );
        e
    })
}

/// Renders core action rows as a Telegram inline keyboard.
fn markup_of(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.iter().map(|row| {
        row.iter()
            .map(|action| InlineKeyboardButton::callback(action.label.clone(), action.key.encode()))
            .collect::<Vec<_>>()
    }))
}

/// [`Deliverer`] backed by the Telegram Bot API.
pub struct TelegramDeliverer {
    bot: Bot,
}

impl TelegramDeliverer {
    /// Wraps a bot handle.
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn send(
        &self,
        chat_id: ChatId,
        text: &str,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message> {
        retry_api_operation(|| async {
            let request = self
                .bot
                .send_message(chat_id, text.to_string())
                .parse_mode(ParseMode::Html);
            let request = match markup {
                Some(m) => request.reply_markup(m.clone()),
                None => request,
            };
            request
                .await
                .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
        })
        .await
    }

    async fn edit(
        &self,
        chat_id: ChatId,
        msg_id: MessageId,
        text: &str,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message> {
        retry_api_operation(|| async {
            let request = self
                .bot
                .edit_message_text(chat_id, msg_id, text.to_string())
                .parse_mode(ParseMode::Html);
            let request = match markup {
                Some(m) => request.reply_markup(m.clone()),
                None => request,
            };
            request
                .await
                .map_err(|e| anyhow::anyhow!("Telegram edit error: {e}"))
        })
        .await
    }
}

#[async_trait]
impl Deliverer for TelegramDeliverer {
    async fn deliver(
        &self,
        identity: i64,
        target: Option<MessageHandle>,
        content: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<MessageHandle, BotError> {
        let chat_id = ChatId(identity);
        let markup = keyboard.as_ref().map(markup_of);
        let markup = markup.as_ref();

        let result = match target {
            None => self.send(chat_id, content, markup).await,
            Some(handle) => match self
                .edit(chat_id, MessageId(handle.0), content, markup)
                .await
            {
                Ok(message) => Ok(message),
                Err(e) => {
                    let err_msg = e.to_string();
                    if err_msg.contains(ERROR_NOT_MODIFIED) {
                        // Same content already shown; keep the handle.
                        debug!(user_id = identity, "edit skipped, content unchanged");
                        return Ok(handle);
                    }
                    if err_msg.contains(ERROR_NOT_FOUND) {
                        debug!(user_id = identity, "edit target gone, sending fresh");
                        self.send(chat_id, content, markup).await
                    } else {
                        Err(e)
                    }
                }
            },
        };

        result
            .map(|message| MessageHandle(message.id.0))
            .map_err(|e| BotError::DeliveryFailure {
                identity,
                reason: e.to_string(),
            })
    }
}

fn identity_of(user: &User) -> i64 {
    user.id.0.cast_signed()
}

fn first_name_of(user: &User) -> String {
    if user.first_name.is_empty() {
        "Friend".to_string()
    } else {
        user.first_name.clone()
    }
}

/// Maps a chat message to a core event. Non-command messages and messages
/// without a sender yield `None` and are ignored.
fn event_from_message(msg: &Message) -> Option<Event> {
    let user = msg.from.as_ref()?;
    let text = msg.text()?;
    let command = Command::parse(text)?;
    Some(Event {
        identity: identity_of(user),
        first_name: first_name_of(user),
        kind: EventKind::Command(command),
        origin: None,
        timestamp: Utc::now(),
    })
}

/// Maps a callback query to a core event, carrying the handle of the message
/// the tapped keyboard hangs off so the reply can edit it in place.
fn event_from_callback(q: &CallbackQuery) -> Option<Event> {
    let data = q.data.as_deref()?;
    let origin = q.message.as_ref().map(|m| MessageHandle(m.id().0));
    Some(Event {
        identity: identity_of(&q.from),
        first_name: first_name_of(&q.from),
        kind: EventKind::Callback(CallbackKey::parse(data)),
        origin,
        timestamp: Utc::now(),
    })
}

async fn on_message(
    msg: Message,
    dispatcher: Arc<Dispatcher>,
) -> Result<(), teloxide::RequestError> {
    if let Some(event) = event_from_message(&msg) {
        // Faults are contained and logged inside the pipeline.
        dispatcher.dispatch(event).await;
    }
    respond(())
}

async fn on_callback(
    bot: Bot,
    q: CallbackQuery,
    dispatcher: Arc<Dispatcher>,
) -> Result<(), teloxide::RequestError> {
    if let Some(event) = event_from_callback(&q) {
        dispatcher.dispatch(event).await;
    }
    // Clear the button's loading spinner regardless of outcome.
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!("failed to answer callback query: {e}");
    }
    respond(())
}

/// Builds the teloxide dispatcher and runs long polling until shutdown.
pub async fn run(bot: Bot, dispatcher: Arc<Dispatcher>) {
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_callback_query().endpoint(on_callback));

    teloxide::dispatching::Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![dispatcher])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}
