//! # Concurrency & Tokens
//!
//! Grounded in `execution::timeout::QueryTimeout`/`CancelHandle` and
//! `execution::limits::ResourceLimits`: the same cooperative-cancellation
//! shape, adapted to this crate's single externally-visible concurrency
//! surface — gating concurrent queries against shared, read-only planner
//! state (`TermTable`, `ShardDefinition`, `PlanRows`) while a host
//! reconfigures it.
//!
//! `TokenManager` uses `parking_lot::RwLock` rather than the standard
//! library's, matching this lineage's choice for storage-engine state
//! guards: uncontended read acquisition is cheaper and the lock never needs
//! poisoning semantics here (a panicking query should not wedge every other
//! query's ability to plan).

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Granted by [`TokenManager::acquire`]; held for the lifetime of one
/// query's planning and interpretation. Dropping it releases the query's
/// claim on shared state.
pub struct QueryToken {
    manager: Arc<Inner>,
}

impl Drop for QueryToken {
    fn drop(&mut self) {
        self.manager.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

struct Inner {
    outstanding: AtomicU64,
    reconfiguring: RwLock<bool>,
}

/// Gate between concurrent queries and a pending reconfiguration of shared
/// planner state. Queries acquire a [`QueryToken`] before planning/executing;
/// a reconfiguration is refused new tokens until outstanding ones drop.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    /// Create a token manager with no outstanding tokens and no pending
    /// reconfiguration.
    pub fn new() -> Self {
        TokenManager {
            inner: Arc::new(Inner {
                outstanding: AtomicU64::new(0),
                reconfiguring: RwLock::new(false),
            }),
        }
    }

    /// Acquire a token for one query, or `None` if a reconfiguration is in
    /// progress.
    pub fn acquire(&self) -> Option<QueryToken> {
        let reconfiguring = self.inner.reconfiguring.read();
        if *reconfiguring {
            return None;
        }
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        Some(QueryToken { manager: Arc::clone(&self.inner) })
    }

    /// Number of tokens currently outstanding.
    pub fn outstanding(&self) -> u64 {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Run `reconfigure` with new-token acquisition blocked, returning once
    /// every outstanding token has dropped. Does not itself wait for
    /// in-flight queries to finish beyond spinning on the outstanding
    /// count; callers with a runtime should yield between polls.
    pub fn reconfigure<T>(&self, reconfigure: impl FnOnce() -> T) -> T {
        *self.inner.reconfiguring.write() = true;
        while self.inner.outstanding.load(Ordering::Acquire) > 0 {
            std::thread::yield_now();
        }
        let result = reconfigure();
        *self.inner.reconfiguring.write() = false;
        result
    }
}

impl Default for TokenManager {
    fn default() -> Self {
        Self::new()
    }
}
