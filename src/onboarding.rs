//! Per-user onboarding state machine and progressive-reveal delivery.
//!
//! Lifecycle: `New → Greeting → Menu`, with `Greeting → Terminated` on
//! cancellation or timeout. A live session exists only while the animation
//! runs; once an identity reaches `Menu` the machine is out of the loop for
//! further interaction.
//!
//! The machine delivers exactly one message per transition and never retries
//! itself: a delivery failure leaves the session at its current stage, and
//! the caller decides when to try again.

use crate::cache::{ContentKind, MessageCache};
use crate::deliver::{Deliverer, MessageHandle};
use crate::error::BotError;
use crate::messages;
use crate::shard::ShardedMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Lifecycle phase of an identity with respect to onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Never seen before.
    New,
    /// Animation in progress; a live session exists.
    Greeting,
    /// Onboarding finished; stable terminal phase.
    Menu,
    /// Cancelled or reclaimed by the stale-session sweep.
    Terminated,
}

/// Live onboarding session. Owned exclusively by the machine's table.
#[derive(Debug)]
struct OnboardingSession {
    stage_index: usize,
    created_at: Instant,
    /// Handle of the animation message; stages edit it in place.
    handle: Option<MessageHandle>,
    first_name: String,
}

/// Outcome of a [`Onboarding::start`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A session was created and stage 0 delivered; the caller should keep
    /// calling [`Onboarding::advance`] to run the animation.
    Animating,
    /// A returning user's cached welcome was replayed; no animation.
    ReplayedFromCache,
}

/// Outcome of an [`Onboarding::advance`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// A mid-sequence stage was delivered.
    Staged {
        /// Index of the stage just delivered.
        stage_index: usize,
    },
    /// The final welcome was delivered and the identity retired to `Menu`.
    Completed,
}

/// Per-user onboarding state machine.
pub struct Onboarding {
    sessions: ShardedMap<OnboardingSession>,
    completed: ShardedMap<()>,
    terminated: ShardedMap<()>,
    stages: Vec<String>,
    session_timeout: Duration,
    cache: Arc<MessageCache>,
    deliverer: Arc<dyn Deliverer>,
}

impl Onboarding {
    /// Creates the machine with the given reveal stages.
    ///
    /// An empty stage list falls back to [`messages::default_stages`], so a
    /// session always has at least one stage to show.
    #[must_use]
    pub fn new(
        stages: Vec<String>,
        session_timeout: Duration,
        cache: Arc<MessageCache>,
        deliverer: Arc<dyn Deliverer>,
    ) -> Self {
        let stages = if stages.is_empty() {
            messages::default_stages()
        } else {
            stages
        };
        Self {
            sessions: ShardedMap::default(),
            completed: ShardedMap::default(),
            terminated: ShardedMap::default(),
            stages,
            session_timeout,
            cache,
            deliverer,
        }
    }

    /// Current phase of `identity`.
    pub fn phase(&self, identity: i64) -> Phase {
        if self.sessions.contains(identity) {
            Phase::Greeting
        } else if self.completed.contains(identity) {
            Phase::Menu
        } else if self.terminated.contains(identity) {
            Phase::Terminated
        } else {
            Phase::New
        }
    }

    /// Number of sessions currently in `Greeting`.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Begins (or restarts) onboarding for `identity`.
    ///
    /// A returning `Menu` user with a reusable cached welcome skips the
    /// animation entirely and gets the cached final message replayed — a UX
    /// shortcut, not a correctness requirement. Everyone else gets a fresh
    /// session seeded at stage 0, with stage 0 delivered immediately.
    ///
    /// # Errors
    ///
    /// [`BotError::DeliveryFailure`] when the outbound send fails. The
    /// session (if one was created) stays at stage 0 and is retryable.
    pub async fn start(
        &self,
        identity: i64,
        first_name: &str,
        now: Instant,
    ) -> Result<StartOutcome, BotError> {
        if self.phase(identity) == Phase::Menu {
            if let Some(cached) = self.cache.get(identity, ContentKind::Welcome) {
                debug!(user_id = identity, "replaying cached welcome");
                self.deliverer
                    .deliver(identity, None, &cached, Some(messages::main_menu_keyboard()))
                    .await?;
                return Ok(StartOutcome::ReplayedFromCache);
            }
        }

        self.terminated.remove(identity);
        self.completed.remove(identity);
        self.sessions.insert(
            identity,
            OnboardingSession {
                stage_index: 0,
                created_at: now,
                handle: None,
                first_name: first_name.to_string(),
            },
        );
        info!(user_id = identity, "onboarding started");

        let stage = self.stages[0].clone();
        let handle = self.deliverer.deliver(identity, None, &stage, None).await?;
        if let Some(session) = self.sessions.lock(identity).get_mut(&identity) {
            session.handle = Some(handle);
        }
        Ok(StartOutcome::Animating)
    }

    /// Delivers the next stage of the animation for `identity`.
    ///
    /// The stage message is edited in place through the stored handle. The
    /// stage index only moves after a successful delivery, so a failed or
    /// cancelled delivery leaves the session retryable at its current stage.
    /// Advancing past the last stage delivers the final welcome, caches it,
    /// and retires the identity to `Menu`.
    ///
    /// # Errors
    ///
    /// [`BotError::UnknownSession`] when `identity` has no live session (a
    /// no-op: nothing is mutated, the caller may issue a fresh start).
    /// [`BotError::DeliveryFailure`] when the outbound send fails.
    pub async fn advance(&self, identity: i64) -> Result<AdvanceOutcome, BotError> {
        let (next_index, handle, first_name) = {
            let guard = self.sessions.lock(identity);
            let Some(session) = guard.get(&identity) else {
                return Err(BotError::UnknownSession { identity });
            };
            (
                session.stage_index + 1,
                session.handle,
                session.first_name.clone(),
            )
        };

        if next_index < self.stages.len() {
            let content = self.stages[next_index].clone();
            let new_handle = self
                .deliverer
                .deliver(identity, handle, &content, None)
                .await?;
            if let Some(session) = self.sessions.lock(identity).get_mut(&identity) {
                session.stage_index = next_index;
                session.handle = Some(new_handle);
            }
            Ok(AdvanceOutcome::Staged {
                stage_index: next_index,
            })
        } else {
            let welcome = messages::welcome(&first_name);
            self.deliverer
                .deliver(
                    identity,
                    handle,
                    &welcome,
                    Some(messages::main_menu_keyboard()),
                )
                .await?;
            self.cache.put(identity, ContentKind::Welcome, welcome);
            self.sessions.remove(identity);
            self.completed.insert(identity, ());
            info!(user_id = identity, "onboarding complete");
            Ok(AdvanceOutcome::Completed)
        }
    }

    /// Skips the animation entirely, delivering the final welcome in one
    /// step. Used when animations are disabled in settings.
    ///
    /// # Errors
    ///
    /// [`BotError::DeliveryFailure`] when the outbound send fails; the
    /// identity's phase is unchanged in that case.
    pub async fn complete_directly(
        &self,
        identity: i64,
        first_name: &str,
    ) -> Result<(), BotError> {
        let welcome = messages::welcome(first_name);
        self.deliverer
            .deliver(identity, None, &welcome, Some(messages::main_menu_keyboard()))
            .await?;
        self.cache.put(identity, ContentKind::Welcome, welcome);
        self.sessions.remove(identity);
        self.terminated.remove(identity);
        self.completed.insert(identity, ());
        Ok(())
    }

    /// User-issued cancellation: `Greeting → Terminated`.
    ///
    /// # Errors
    ///
    /// [`BotError::UnknownSession`] when there is no live session to cancel;
    /// no state is mutated.
    pub fn cancel(&self, identity: i64) -> Result<(), BotError> {
        if self.sessions.remove(identity).is_some() {
            self.terminated.insert(identity, ());
            info!(user_id = identity, "onboarding cancelled");
            Ok(())
        } else {
            Err(BotError::UnknownSession { identity })
        }
    }

    /// Identities whose sessions look stale at `now`. Read-only scan; the
    /// sweep re-checks each candidate under per-identity exclusion with
    /// [`Self::reap_if_stale`] before destroying anything.
    pub fn stale_candidates(&self, now: Instant) -> Vec<i64> {
        self.sessions
            .keys()
            .into_iter()
            .filter(|&identity| {
                self.sessions
                    .lock(identity)
                    .get(&identity)
                    .is_some_and(|s| now.duration_since(s.created_at) >= self.session_timeout)
            })
            .collect()
    }

    /// Destroys the session for `identity` if it is still stale at `now`.
    /// Returns whether a session was reclaimed.
    pub fn reap_if_stale(&self, identity: i64, now: Instant) -> bool {
        let reclaimed = {
            let mut shard = self.sessions.lock(identity);
            let stale = shard
                .get(&identity)
                .is_some_and(|s| now.duration_since(s.created_at) >= self.session_timeout);
            if stale {
                shard.remove(&identity);
            }
            stale
        };
        if reclaimed {
            self.terminated.insert(identity, ());
        }
        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingDeliverer;

    const TIMEOUT: Duration = Duration::from_secs(600);

    fn stages(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("stage {i}")).collect()
    }

    fn machine(n_stages: usize) -> (Onboarding, Arc<RecordingDeliverer>) {
        let deliverer = Arc::new(RecordingDeliverer::default());
        let cache = Arc::new(MessageCache::new(8).expect("valid capacity"));
        let onboarding = Onboarding::new(stages(n_stages), TIMEOUT, cache, deliverer.clone());
        (onboarding, deliverer)
    }

    #[tokio::test]
    async fn happy_path_lands_in_menu() {
        let (onboarding, deliverer) = machine(4);
        let now = Instant::now();

        assert_eq!(onboarding.phase(7), Phase::New);
        assert_eq!(
            onboarding.start(7, "Ada", now).await.expect("start"),
            StartOutcome::Animating
        );
        assert_eq!(onboarding.phase(7), Phase::Greeting);

        for _ in 0..3 {
            assert!(matches!(
                onboarding.advance(7).await.expect("advance"),
                AdvanceOutcome::Staged { .. }
            ));
        }
        assert_eq!(
            onboarding.advance(7).await.expect("final advance"),
            AdvanceOutcome::Completed
        );
        assert_eq!(onboarding.phase(7), Phase::Menu);
        // Stage 0 + three stages + final welcome.
        assert_eq!(deliverer.count(), 5);
    }

    #[tokio::test]
    async fn stages_edit_one_message_in_place() {
        let (onboarding, deliverer) = machine(3);
        onboarding.start(7, "Ada", Instant::now()).await.expect("start");
        onboarding.advance(7).await.expect("advance");
        onboarding.advance(7).await.expect("advance");

        let records = deliverer.records();
        // First delivery opens a new message, the rest edit it.
        assert_eq!(records[0].target, None);
        let handle = records[0].handle;
        assert!(records[1..].iter().all(|r| r.target == Some(handle)));
    }

    #[tokio::test]
    async fn welcome_carries_the_main_menu() {
        use crate::event::{CallbackKey, MenuSection};

        let (onboarding, deliverer) = machine(2);
        onboarding.start(7, "Ada", Instant::now()).await.expect("start");
        onboarding.advance(7).await.expect("advance");
        onboarding.advance(7).await.expect("complete");

        let records = deliverer.records();
        // Stage messages are bare; only the final welcome gets buttons.
        assert!(records[..2].iter().all(|r| r.keyboard.is_none()));
        let keyboard = records[2].keyboard.as_ref().expect("menu keyboard");
        let keys: Vec<_> = keyboard.iter().flatten().map(|a| a.key.clone()).collect();
        assert!(keys.contains(&CallbackKey::Menu(MenuSection::Tasks)));
        assert!(keys.contains(&CallbackKey::Menu(MenuSection::About)));
    }

    #[tokio::test]
    async fn cancel_from_greeting_terminates() {
        let (onboarding, _deliverer) = machine(4);
        onboarding.start(7, "Ada", Instant::now()).await.expect("start");
        onboarding.cancel(7).expect("cancel");
        assert_eq!(onboarding.phase(7), Phase::Terminated);
    }

    #[tokio::test]
    async fn advance_without_session_is_a_noop() {
        let (onboarding, deliverer) = machine(4);
        let err = onboarding.advance(7).await.expect_err("no session");
        assert!(matches!(err, BotError::UnknownSession { identity: 7 }));
        assert_eq!(deliverer.count(), 0);
        assert_eq!(onboarding.phase(7), Phase::New);
    }

    #[tokio::test]
    async fn cancel_without_session_reports_unknown() {
        let (onboarding, _deliverer) = machine(4);
        assert!(matches!(
            onboarding.cancel(7),
            Err(BotError::UnknownSession { identity: 7 })
        ));
    }

    #[tokio::test]
    async fn delivery_failure_leaves_stage_retryable() {
        let (onboarding, deliverer) = machine(4);
        onboarding.start(7, "Ada", Instant::now()).await.expect("start");

        deliverer.fail_next();
        let err = onboarding.advance(7).await.expect_err("delivery fails");
        assert!(matches!(err, BotError::DeliveryFailure { .. }));
        assert_eq!(onboarding.phase(7), Phase::Greeting);

        // Retry resumes from the same stage.
        assert_eq!(
            onboarding.advance(7).await.expect("retry"),
            AdvanceOutcome::Staged { stage_index: 1 }
        );
    }

    #[tokio::test]
    async fn returning_user_replays_cached_welcome() {
        let (onboarding, deliverer) = machine(2);
        let now = Instant::now();
        onboarding.start(7, "Ada", now).await.expect("start");
        onboarding.advance(7).await.expect("advance");
        onboarding.advance(7).await.expect("complete");
        assert_eq!(onboarding.phase(7), Phase::Menu);
        let before = deliverer.count();

        assert_eq!(
            onboarding.start(7, "Ada", now).await.expect("restart"),
            StartOutcome::ReplayedFromCache
        );
        assert_eq!(onboarding.phase(7), Phase::Menu);
        assert_eq!(deliverer.count(), before + 1);
    }

    #[tokio::test]
    async fn returning_user_without_cache_reanimates() {
        let deliverer = Arc::new(RecordingDeliverer::default());
        // Capacity 1 so a second user's welcome evicts the first.
        let cache = Arc::new(MessageCache::new(1).expect("valid capacity"));
        let onboarding = Onboarding::new(stages(2), TIMEOUT, cache, deliverer.clone());
        let now = Instant::now();

        onboarding.start(7, "Ada", now).await.expect("start");
        onboarding.advance(7).await.expect("advance");
        onboarding.advance(7).await.expect("complete");
        onboarding.complete_directly(8, "Bob").await.expect("evicts");

        assert_eq!(
            onboarding.start(7, "Ada", now).await.expect("restart"),
            StartOutcome::Animating
        );
        assert_eq!(onboarding.phase(7), Phase::Greeting);
    }

    #[tokio::test]
    async fn sweep_reclaims_only_stale_sessions() {
        let (onboarding, _deliverer) = machine(4);
        let start = Instant::now();
        onboarding.start(1, "Old", start).await.expect("start");
        onboarding
            .start(2, "Fresh", start + TIMEOUT / 2)
            .await
            .expect("start");

        let later = start + TIMEOUT;
        assert_eq!(onboarding.stale_candidates(later), vec![1]);
        assert!(onboarding.reap_if_stale(1, later));
        assert!(!onboarding.reap_if_stale(2, later));

        assert_eq!(onboarding.phase(1), Phase::Terminated);
        assert_eq!(onboarding.phase(2), Phase::Greeting);
    }

    #[tokio::test]
    async fn complete_directly_skips_animation() {
        let (onboarding, deliverer) = machine(6);
        onboarding.complete_directly(7, "Ada").await.expect("direct");
        assert_eq!(onboarding.phase(7), Phase::Menu);
        assert_eq!(deliverer.count(), 1);
    }
}
