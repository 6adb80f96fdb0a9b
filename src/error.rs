//! Bot error taxonomy.

use thiserror::Error;

/// Errors produced while processing a single inbound event.
///
/// Every variant is recoverable at the process level. The middleware
/// pipeline's containment stage is the final backstop: a fault is terminal
/// for its event, never for the process, and nothing here crosses back into
/// the transport layer.
#[derive(Debug, Error)]
pub enum BotError {
    /// The identity exhausted its rate window.
    #[error("rate limit exceeded for user {identity}")]
    AdmissionDenied {
        /// User the denial applies to.
        identity: i64,
    },

    /// Advance or cancel was issued for an identity with no live onboarding
    /// session. No state was mutated; a fresh `/start` recovers.
    #[error("no active onboarding session for user {identity}")]
    UnknownSession {
        /// User the operation targeted.
        identity: i64,
    },

    /// Outbound delivery failed. No per-user state was mutated; retrying the
    /// same operation is safe.
    #[error("delivery to user {identity} failed: {reason}")]
    DeliveryFailure {
        /// Target of the failed delivery.
        identity: i64,
        /// Transport-level failure description.
        reason: String,
    },

    /// Uncaught handler error, contained by the pipeline.
    #[error("handler fault: {0}")]
    HandlerFault(#[from] anyhow::Error),
}

impl BotError {
    /// True when the fault left no per-user state modified and retrying the
    /// same event is safe.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DeliveryFailure { .. } | Self::AdmissionDenied { .. }
        )
    }
}
