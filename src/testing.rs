//! Shared fakes for unit tests.

use crate::clock::Clock;
use crate::deliver::{Deliverer, Keyboard, MessageHandle};
use crate::error::BotError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// One recorded delivery.
#[derive(Debug, Clone)]
pub struct DeliveryRecord {
    /// Target identity.
    pub identity: i64,
    /// Edit target, if any.
    pub target: Option<MessageHandle>,
    /// Delivered content.
    pub content: String,
    /// Action rows attached to the message, if any.
    pub keyboard: Option<Keyboard>,
    /// Handle returned to the caller.
    pub handle: MessageHandle,
}

/// In-memory [`Deliverer`] that records every call and can fail on demand.
#[derive(Debug, Default)]
pub struct RecordingDeliverer {
    records: Mutex<Vec<DeliveryRecord>>,
    next_handle: AtomicI32,
    fail_next: AtomicBool,
}

impl RecordingDeliverer {
    /// Makes the next `deliver` call fail with a [`BotError::DeliveryFailure`].
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Number of successful deliveries so far.
    pub fn count(&self) -> usize {
        self.records().len()
    }

    /// Snapshot of all successful deliveries.
    pub fn records(&self) -> Vec<DeliveryRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Contents of all successful deliveries, in order.
    pub fn contents(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.content).collect()
    }
}

#[async_trait]
impl Deliverer for RecordingDeliverer {
    async fn deliver(
        &self,
        identity: i64,
        target: Option<MessageHandle>,
        content: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<MessageHandle, BotError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(BotError::DeliveryFailure {
                identity,
                reason: "injected failure".to_string(),
            });
        }
        let handle = match target {
            Some(existing) => existing,
            None => MessageHandle(self.next_handle.fetch_add(1, Ordering::SeqCst)),
        };
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(DeliveryRecord {
                identity,
                target,
                content: content.to_string(),
                keyboard,
                handle,
            });
        Ok(handle)
    }
}

/// Manually driven [`Clock`] for deterministic window and timeout tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }
}

impl ManualClock {
    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
