//! Event routing with per-identity serialization.
//!
//! The dispatcher is the top of the core: it maps each inbound event to a
//! handler, wraps the invocation in the middleware pipeline, and guarantees
//! that at most one handler runs per identity at a time. Events from
//! different identities proceed fully in parallel.

use crate::cache::{ContentKind, MessageCache};
use crate::clock::Clock;
use crate::deliver::Deliverer;
use crate::error::BotError;
use crate::event::{CallbackKey, Command, Event, EventKind};
use crate::limiter::RateLimiter;
use crate::messages::{self, StatsSnapshot};
use crate::middleware::{Pipeline, PipelineContext};
use crate::onboarding::{AdvanceOutcome, Onboarding, StartOutcome};
use crate::shard::ShardedMap;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Per-identity serialization locks.
///
/// Each identity gets its own async mutex, held for the entire pipeline run,
/// so two events for the same user can never interleave. Distinct identities
/// only share a shard lock for the brief get-or-insert; no cross-identity
/// lock is held across an await point.
struct IdentityLocks {
    locks: ShardedMap<Arc<AsyncMutex<()>>>,
}

impl IdentityLocks {
    fn new() -> Self {
        Self {
            locks: ShardedMap::default(),
        }
    }

    async fn acquire(&self, identity: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut shard = self.locks.lock(identity);
            shard
                .entry(identity)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Tunables for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Pause between animation stages.
    pub stage_delay: Duration,
    /// Whether `/start` runs the progressive reveal at all.
    pub enable_animations: bool,
    /// Users allowed to see detailed `/stats`.
    pub admin_ids: HashSet<i64>,
}

/// Top-level event router.
pub struct Dispatcher {
    pipeline: Pipeline,
    onboarding: Arc<Onboarding>,
    limiter: Arc<RateLimiter>,
    cache: Arc<MessageCache>,
    deliverer: Arc<dyn Deliverer>,
    clock: Arc<dyn Clock>,
    locks: IdentityLocks,
    config: DispatcherConfig,
    started_at: DateTime<Utc>,
}

impl Dispatcher {
    /// Wires the dispatcher to its collaborators.
    #[must_use]
    pub fn new(
        pipeline: Pipeline,
        onboarding: Arc<Onboarding>,
        limiter: Arc<RateLimiter>,
        cache: Arc<MessageCache>,
        deliverer: Arc<dyn Deliverer>,
        clock: Arc<dyn Clock>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            pipeline,
            onboarding,
            limiter,
            cache,
            deliverer,
            clock,
            locks: IdentityLocks::new(),
            config,
            started_at: Utc::now(),
        }
    }

    /// Processes one inbound event through the pipeline.
    ///
    /// Serializes on the event's identity first: a second event for the same
    /// user waits here until the current handler (animation included)
    /// finishes. The returned context never carries an unhandled fault.
    pub async fn dispatch(&self, event: Event) -> PipelineContext {
        let _serialized = self.locks.acquire(event.identity).await;
        let ctx = PipelineContext::new(event.clone(), self.clock.now());
        let handler = self.route(event);
        self.pipeline.run(ctx, handler).await
    }

    /// Pure routing decision: event kind to handler future. All actual work
    /// happens inside the pipeline-wrapped handler.
    fn route(&self, event: Event) -> BoxFuture<'_, Result<(), BotError>> {
        Box::pin(async move {
            match event.kind.clone() {
                EventKind::Command(command) => self.handle_command(&event, command).await,
                EventKind::Callback(key) => self.handle_callback(&event, key).await,
            }
        })
    }

    async fn handle_command(&self, event: &Event, command: Command) -> Result<(), BotError> {
        match command {
            Command::Start => self.handle_start(event).await,
            Command::Help => self.reply(event.identity, &messages::help()).await,
            Command::About => self.reply(event.identity, &messages::about()).await,
            Command::Stats => self.handle_stats(event).await,
            Command::Settings => self.handle_settings(event).await,
            Command::Cancel => self.handle_cancel(event).await,
            Command::Unknown(name) => {
                self.reply(event.identity, &messages::not_found(&name)).await
            }
        }
    }

    async fn handle_callback(&self, event: &Event, key: CallbackKey) -> Result<(), BotError> {
        match key {
            CallbackKey::Menu(section) => {
                let content = messages::menu_section(section);
                self.deliverer
                    .deliver(
                        event.identity,
                        event.origin,
                        &content,
                        Some(messages::back_keyboard()),
                    )
                    .await
                    .map(drop)
            }
            CallbackKey::BackToMenu => {
                // Prefer the cached welcome over re-rendering.
                let content = self
                    .cache
                    .get(event.identity, ContentKind::Welcome)
                    .unwrap_or_else(|| messages::welcome(&event.first_name));
                self.deliverer
                    .deliver(
                        event.identity,
                        event.origin,
                        &content,
                        Some(messages::main_menu_keyboard()),
                    )
                    .await
                    .map(drop)
            }
            CallbackKey::Unknown(data) => {
                debug!(user_id = event.identity, data, "unknown callback key");
                self.reply(event.identity, messages::UNKNOWN_ACTION).await
            }
        }
    }

    async fn handle_start(&self, event: &Event) -> Result<(), BotError> {
        if !self.config.enable_animations {
            return self
                .onboarding
                .complete_directly(event.identity, &event.first_name)
                .await;
        }
        let outcome = self
            .onboarding
            .start(event.identity, &event.first_name, self.clock.now())
            .await?;
        match outcome {
            StartOutcome::ReplayedFromCache => Ok(()),
            StartOutcome::Animating => self.run_animation(event.identity).await,
        }
    }

    /// Drives the progressive reveal to completion. A delivery failure stops
    /// the loop with the session parked at its current stage; the next
    /// `/start` or `advance` resumes from there.
    async fn run_animation(&self, identity: i64) -> Result<(), BotError> {
        loop {
            tokio::time::sleep(self.config.stage_delay).await;
            match self.onboarding.advance(identity).await? {
                AdvanceOutcome::Staged { .. } => {}
                AdvanceOutcome::Completed => return Ok(()),
            }
        }
    }

    async fn handle_cancel(&self, event: &Event) -> Result<(), BotError> {
        match self.onboarding.cancel(event.identity) {
            Ok(()) => self.reply(event.identity, messages::CANCELLED).await,
            Err(BotError::UnknownSession { .. }) => {
                self.reply(event.identity, messages::NOTHING_TO_CANCEL).await
            }
            Err(other) => Err(other),
        }
    }

    async fn handle_stats(&self, event: &Event) -> Result<(), BotError> {
        let snapshot = StatsSnapshot {
            uptime_secs: (Utc::now() - self.started_at).num_seconds().unsigned_abs(),
            tracked_identities: self.limiter.tracked_identities(),
            denied_total: self.limiter.denied_total(),
            cache_entries: self.cache.len(),
            active_sessions: self.onboarding.active_sessions(),
        };
        let detailed = self.config.admin_ids.contains(&event.identity);
        self.reply(event.identity, &messages::stats(&snapshot, detailed))
            .await
    }

    async fn handle_settings(&self, event: &Event) -> Result<(), BotError> {
        let content = messages::settings(
            self.config.enable_animations,
            self.limiter.limit(),
            self.limiter.period().as_secs(),
        );
        self.reply(event.identity, &content).await
    }

    async fn reply(&self, identity: i64, content: &str) -> Result<(), BotError> {
        self.deliverer
            .deliver(identity, None, content, None)
            .await
            .map(drop)
    }

    /// Spawns the periodic stale-session sweep.
    ///
    /// Candidates are collected without locks, then each is re-checked and
    /// destroyed under the same per-identity exclusion live dispatch uses, so
    /// the sweep can never reap a session mid-transition. The task exits when
    /// `shutdown` is cancelled.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        debug!("session sweeper stopped");
                        return;
                    }
                    _ = ticker.tick() => {}
                }

                let now = dispatcher.clock.now();
                for identity in dispatcher.onboarding.stale_candidates(now) {
                    let _serialized = dispatcher.locks.acquire(identity).await;
                    if dispatcher.onboarding.reap_if_stale(identity, now) {
                        info!(user_id = identity, "reclaimed stale onboarding session");
                    }
                }
            }
        })
    }
}
