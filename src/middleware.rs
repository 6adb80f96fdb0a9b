//! Event middleware pipeline.
//!
//! Every inbound event runs through an ordered interceptor chain before its
//! handler: logging, then rate limiting, with error containment wrapped
//! around the handler itself. [`Pipeline::run`] never lets a fault escape to
//! the caller — the returned context either reflects a completed side effect
//! or carries `short_circuited`/`error`.

use crate::clock::Clock;
use crate::deliver::Deliverer;
use crate::error::BotError;
use crate::event::Event;
use crate::limiter::RateLimiter;
use crate::messages;
use crate::shard::ShardedMap;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Per-dispatch context threaded through the pipeline. Created fresh per
/// event, discarded after dispatch completes.
#[derive(Debug)]
pub struct PipelineContext {
    /// Identity the event belongs to.
    pub identity: i64,
    /// The inbound event.
    pub event: Event,
    /// Set when an interceptor halted the chain before the handler ran.
    pub short_circuited: bool,
    /// Populated when the event's processing failed.
    pub error: Option<BotError>,
    started_at: Instant,
}

impl PipelineContext {
    /// Wraps an event for one pipeline run.
    #[must_use]
    pub fn new(event: Event, now: Instant) -> Self {
        Self {
            identity: event.identity,
            event,
            short_circuited: false,
            error: None,
            started_at: now,
        }
    }

    /// Whether the handler ran to completion.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        !self.short_circuited && self.error.is_none()
    }
}

/// Decision returned by an interceptor.
pub enum Flow {
    /// Hand control to the next stage.
    Continue,
    /// Stop the chain and answer the user with `notice`.
    Halt {
        /// User-facing short-circuit reply.
        notice: String,
    },
}

/// A pipeline stage evaluated, in registration order, before the handler.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Stage name for logs.
    fn name(&self) -> &'static str;

    /// Inspects the context and decides whether the chain continues.
    async fn check(&self, ctx: &mut PipelineContext) -> Flow;
}

/// Records identity and event kind for every inbound event.
///
/// Never short-circuits; logging must never break dispatch.
pub struct Logging;

#[async_trait]
impl Interceptor for Logging {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn check(&self, ctx: &mut PipelineContext) -> Flow {
        info!(
            user_id = ctx.identity,
            kind = ctx.event.kind.label(),
            received_at = %ctx.event.timestamp.to_rfc3339(),
            "inbound event"
        );
        Flow::Continue
    }
}

/// Admission control stage.
///
/// Denials short-circuit with a throttle notice; repeat denials escalate the
/// wording. An admitted event wipes the identity's warning slate.
pub struct RateLimiting {
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    warnings: ShardedMap<u32>,
}

impl RateLimiting {
    /// Creates the stage around a shared limiter.
    #[must_use]
    pub fn new(limiter: Arc<RateLimiter>, clock: Arc<dyn Clock>) -> Self {
        Self {
            limiter,
            clock,
            warnings: ShardedMap::default(),
        }
    }
}

#[async_trait]
impl Interceptor for RateLimiting {
    fn name(&self) -> &'static str {
        "rate_limiting"
    }

    async fn check(&self, ctx: &mut PipelineContext) -> Flow {
        let now = self.clock.now();
        if self.limiter.admit(ctx.identity, now) {
            self.warnings.remove(ctx.identity);
            return Flow::Continue;
        }

        let strikes = {
            let mut shard = self.warnings.lock(ctx.identity);
            let count = shard.entry(ctx.identity).or_insert(0);
            *count += 1;
            *count
        };
        warn!(user_id = ctx.identity, strikes, "rate limit exceeded");
        ctx.error = Some(BotError::AdmissionDenied {
            identity: ctx.identity,
        });

        let notice = if strikes <= 1 {
            messages::SLOW_DOWN
        } else {
            messages::RESTRICTED
        };
        Flow::Halt {
            notice: notice.to_string(),
        }
    }
}

/// Ordered interceptor chain wrapping handler dispatch.
pub struct Pipeline {
    interceptors: Vec<Arc<dyn Interceptor>>,
    deliverer: Arc<dyn Deliverer>,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    /// Builds a pipeline over the given stages.
    #[must_use]
    pub fn new(
        interceptors: Vec<Arc<dyn Interceptor>>,
        deliverer: Arc<dyn Deliverer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            interceptors,
            deliverer,
            clock,
        }
    }

    /// Runs `handler` behind the interceptor chain.
    ///
    /// A halting interceptor answers the user and returns with
    /// `short_circuited = true`; the handler future is dropped unpolled. A
    /// handler fault is contained here: logged with full context, answered
    /// with a generic failure notice, and recorded on the context instead of
    /// being re-raised.
    pub async fn run(
        &self,
        mut ctx: PipelineContext,
        handler: BoxFuture<'_, Result<(), BotError>>,
    ) -> PipelineContext {
        for interceptor in &self.interceptors {
            match interceptor.check(&mut ctx).await {
                Flow::Continue => {}
                Flow::Halt { notice } => {
                    ctx.short_circuited = true;
                    debug!(
                        user_id = ctx.identity,
                        stage = interceptor.name(),
                        "pipeline short-circuited"
                    );
                    self.notify(ctx.identity, &notice).await;
                    return ctx;
                }
            }
        }

        match handler.await {
            Ok(()) => {
                let elapsed = self.clock.now().duration_since(ctx.started_at);
                debug!(
                    user_id = ctx.identity,
                    kind = ctx.event.kind.label(),
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "event processed"
                );
            }
            Err(fault) => {
                error!(
                    user_id = ctx.identity,
                    kind = ctx.event.kind.label(),
                    error = %fault,
                    retryable = fault.is_retryable(),
                    "handler fault contained"
                );
                self.notify(ctx.identity, messages::GENERIC_ERROR).await;
                ctx.error = Some(fault);
            }
        }
        ctx
    }

    /// Best-effort notice delivery: a failed notice must never break
    /// dispatch, so the error is logged and swallowed.
    async fn notify(&self, identity: i64, notice: &str) {
        if let Err(e) = self.deliverer.deliver(identity, None, notice, None).await {
            warn!(user_id = identity, error = %e, "failed to deliver pipeline notice");
        }
    }
}
