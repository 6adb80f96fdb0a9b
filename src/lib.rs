#![deny(missing_docs)]
//! Utility Bot core library.
//!
//! Event pipeline, rate limiting, onboarding state machine, message cache,
//! and the Telegram transport adapter.

/// Bounded FIFO cache for rendered content.
pub mod cache;
/// Injectable monotonic clock.
pub mod clock;
/// Configuration management.
pub mod config;
/// Outbound delivery contract.
pub mod deliver;
/// Event routing and per-identity serialization.
pub mod dispatch;
/// Bot error taxonomy.
pub mod error;
/// Inbound event model.
pub mod event;
/// Fixed-window rate limiting.
pub mod limiter;
/// Message templates.
pub mod messages;
/// Event middleware pipeline.
pub mod middleware;
/// Onboarding state machine and progressive reveal.
pub mod onboarding;
/// Lock-striped identity-keyed maps.
pub mod shard;
/// Telegram transport adapter.
pub mod telegram;

#[cfg(test)]
pub mod testing;
