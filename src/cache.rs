//! Bounded FIFO cache for rendered message content.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Kinds of cached rendered content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// Final welcome message after onboarding.
    Welcome,
    /// Main menu body.
    Menu,
    /// Help text.
    Help,
    /// About text.
    About,
}

/// Rejected cache configuration.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("cache capacity must be at least 1")]
pub struct ZeroCapacity;

type Key = (i64, ContentKind);

#[derive(Debug)]
struct Entry {
    value: String,
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<Key, Entry>,
    // Insertion order as (key, seq) slots. Overwrites leave a stale slot
    // behind; a slot is live only while its seq matches the stored entry.
    order: VecDeque<(Key, u64)>,
    next_seq: u64,
}

/// Bounded cache mapping `(identity, kind)` to rendered content.
///
/// Eviction is strict FIFO over insertion order, not recency: the oldest
/// inserted (or re-inserted) entry goes first. Overwriting an existing key
/// refreshes its insertion order. Best effort only — never a source of truth.
pub struct MessageCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl MessageCache {
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// # Errors
    ///
    /// Returns [`ZeroCapacity`] when `capacity` is zero; a cache that can
    /// hold nothing is a configuration mistake, not a useful no-op.
    pub fn new(capacity: usize) -> Result<Self, ZeroCapacity> {
        if capacity == 0 {
            return Err(ZeroCapacity);
        }
        Ok(Self {
            inner: Mutex::new(Inner::default()),
            capacity,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached content for `(identity, kind)`, if present.
    pub fn get(&self, identity: i64, kind: ContentKind) -> Option<String> {
        let inner = self.lock();
        inner.entries.get(&(identity, kind)).map(|e| e.value.clone())
    }

    /// Stores `value` under `(identity, kind)`, evicting the oldest entry
    /// when over capacity. Last write wins; an overwrite counts as a fresh
    /// insertion for ordering purposes.
    pub fn put(&self, identity: i64, kind: ContentKind, value: impl Into<String>) {
        let key = (identity, kind);
        let mut inner = self.lock();

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            key,
            Entry {
                value: value.into(),
                seq,
            },
        );
        inner.order.push_back((key, seq));

        while inner.entries.len() > self.capacity {
            if let Some((old_key, old_seq)) = inner.order.pop_front() {
                let live = inner
                    .entries
                    .get(&old_key)
                    .is_some_and(|e| e.seq == old_seq);
                if live {
                    inner.entries.remove(&old_key);
                }
            }
        }

        // Keep the order queue from accumulating stale overwrite slots.
        if inner.order.len() > inner.entries.len() * 2 + 16 {
            let Inner { entries, order, .. } = &mut *inner;
            order.retain(|(k, s)| entries.get(k).is_some_and(|e| e.seq == *s));
        }
    }

    /// Current number of live entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
