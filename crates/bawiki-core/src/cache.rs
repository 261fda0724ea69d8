//! In-memory response cache and in-flight request registry.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::error::FetchError;
use crate::request::Payload;
use crate::signature::RequestSignature;

/// Outcome shared by every caller attached to one in-flight request.
pub(crate) type SharedFetch = Shared<BoxFuture<'static, Result<Payload, FetchError>>>;

/// A cached payload with its insertion time and lifetime.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    value: Payload,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    pub fn new(value: Payload, inserted_at: Instant, ttl: Duration) -> Self {
        Self {
            value,
            inserted_at,
            ttl,
        }
    }

    /// Valid iff `now < inserted_at + ttl`.
    pub fn is_valid_at(&self, now: Instant) -> bool {
        match self.inserted_at.checked_add(self.ttl) {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }

    pub fn value(&self) -> &Payload {
        &self.value
    }

    pub fn inserted_at(&self) -> Instant {
        self.inserted_at
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// TTL map from signature to payload. Expired entries are logically absent.
#[derive(Debug, Default)]
pub struct CacheStore {
    map: HashMap<RequestSignature, CacheEntry>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Valid payload for `signature`; an expired entry is dropped on the way.
    pub fn get(&mut self, signature: &RequestSignature, now: Instant) -> Option<Payload> {
        let valid = self.map.get(signature)?.is_valid_at(now);
        if valid {
            return self.map.get(signature).map(|entry| entry.value.clone());
        }
        self.map.remove(signature);
        None
    }

    /// Store a payload. A zero TTL is never stored.
    pub fn put(&mut self, signature: RequestSignature, value: Payload, ttl: Duration, now: Instant) {
        if ttl.is_zero() {
            return;
        }
        self.map.insert(signature, CacheEntry::new(value, now, ttl));
    }

    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.map.len();
        self.map.retain(|_, entry| entry.is_valid_at(now));
        before - self.map.len()
    }

    /// Drop everything, returning how many entries were still valid at `now`.
    pub fn clear(&mut self, now: Instant) -> usize {
        let live = self.live_len(now);
        self.map.clear();
        live
    }

    /// Entries still valid at `now`.
    pub fn live_len(&self, now: Instant) -> usize {
        self.map.values().filter(|entry| entry.is_valid_at(now)).count()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Point-in-time counters reported by [`crate::CachedFetcher::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
}

pub(crate) struct InFlightSlot {
    pub(crate) shared: SharedFetch,
    pub(crate) abort: AbortHandle,
}

#[derive(Default)]
pub(crate) struct CacheState {
    pub(crate) store: CacheStore,
    pub(crate) in_flight: HashMap<RequestSignature, InFlightSlot>,
    pub(crate) hits: u64,
    pub(crate) misses: u64,
    pub(crate) coalesced: u64,
    pub(crate) closed: bool,
}

/// Cache map and in-flight map behind one mutex.
///
/// Every check-then-register sequence happens inside a single critical
/// section with no await point, which is what keeps at most one in-flight
/// slot per signature.
#[derive(Default)]
pub struct FetchCache {
    state: Mutex<CacheState>,
}

impl FetchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop every cache entry, returning how many were still live.
    pub fn clear(&self) -> usize {
        let cleared = self.lock().store.clear(Instant::now());
        tracing::info!(cleared, "cleared request cache");
        cleared
    }

    pub fn purge_expired(&self) -> usize {
        let removed = self.lock().store.purge_expired(Instant::now());
        if removed > 0 {
            tracing::debug!(removed, "purged expired cache entries");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let mut state = self.lock();
        state.store.purge_expired(Instant::now());
        CacheStats {
            entries: state.store.len(),
            in_flight: state.in_flight.len(),
            hits: state.hits,
            misses: state.misses,
            coalesced: state.coalesced,
        }
    }

    /// Clear the cache, abort in-flight chains and refuse further work.
    pub fn shutdown(&self) -> usize {
        let mut state = self.lock();
        state.closed = true;
        let aborted = state.in_flight.len();
        for (_, slot) in state.in_flight.drain() {
            slot.abort.abort();
        }
        let cleared = state.store.clear(Instant::now());
        tracing::info!(cleared, aborted, "fetch cache shut down");
        cleared
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().closed
    }
}

impl std::fmt::Debug for FetchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCache")
            .field("stats", &self.stats())
            .finish()
    }
}
