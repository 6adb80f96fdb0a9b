//! Outbound delivery contract.

use crate::error::BotError;
use crate::event::CallbackKey;
use async_trait::async_trait;

/// Opaque handle to a previously delivered message.
///
/// Holding a handle lets a caller edit that message in place, which is how
/// the progressive-reveal animation mutates a single outbound message
/// instead of flooding the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle(pub i32);

/// One tappable action attached under a message.
///
/// Tapping it comes back as an [`crate::event::EventKind::Callback`] carrying
/// `key`, so the action set and the callback routes stay one closed enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Button caption.
    pub label: String,
    /// Callback key the tap produces.
    pub key: CallbackKey,
}

impl Action {
    /// Builds an action from a caption and its callback key.
    #[must_use]
    pub fn new(label: &str, key: CallbackKey) -> Self {
        Self {
            label: label.to_string(),
            key,
        }
    }
}

/// Rows of actions rendered as an inline keyboard under a message.
pub type Keyboard = Vec<Vec<Action>>;

/// Downstream delivery collaborator.
///
/// `target = None` sends a new message; `Some(handle)` edits that message in
/// place. Whether an edit actually edits or falls back to a fresh send is the
/// implementation's decision, not the caller's. A `keyboard` replaces
/// whatever action rows the target message carried before.
///
/// Implementations may be slow or fail transiently. Callers must treat a
/// [`BotError::DeliveryFailure`] as retryable and never let it corrupt
/// process state.
#[async_trait]
pub trait Deliverer: Send + Sync {
    /// Delivers `content` to `identity`, returning the handle of the message
    /// now carrying it.
    async fn deliver(
        &self,
        identity: i64,
        target: Option<MessageHandle>,
        content: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<MessageHandle, BotError>;
}
