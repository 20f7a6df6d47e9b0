//! Single-flight cache for the backend's "current user".
//!
//! DESIGN
//! ======
//! One entry, keyed implicitly by "whoever the backend session belongs to".
//! Concurrent readers join one shared fetch instead of issuing their own.
//! Each invalidation bumps a generation counter; a fetch that started under
//! an older generation never writes the entry, and its waiters re-read.
//!
//! TIMING
//! ======
//! - Fresh for `stale_after`: reads are served from memory.
//! - Stale after that: the next read refetches, `peek` still returns it.
//! - Dropped entirely after `gc_after`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::debug;

use super::User;
use crate::backend::{AuthBackend, BackendError};
use crate::config::CachePolicy;

pub type FetchResult = Result<Option<User>, BackendError>;
/// A read result and the cache generation it belongs to.
pub(crate) type Tracked = (u64, FetchResult);
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

struct Entry {
    user: Option<User>,
    fetched_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entry: Option<Entry>,
    invalidated: bool,
    generation: u64,
    next_fetch_id: u64,
    in_flight: Option<(u64, SharedFetch)>,
}

impl CacheState {
    fn collect_garbage(&mut self, now: Instant, policy: CachePolicy) {
        if self
            .entry
            .as_ref()
            .is_some_and(|e| now.saturating_duration_since(e.fetched_at) >= policy.gc_after)
        {
            self.entry = None;
        }
    }

    fn fresh(&self, now: Instant, policy: CachePolicy) -> Option<Option<User>> {
        if self.invalidated {
            return None;
        }
        self.entry
            .as_ref()
            .filter(|e| now.saturating_duration_since(e.fetched_at) < policy.stale_after)
            .map(|e| e.user.clone())
    }
}

enum Lookup {
    Fresh { generation: u64, user: Option<User> },
    Pending { generation: u64, fetch_id: u64, fetch: SharedFetch },
}

pub struct UserCache {
    backend: Arc<dyn AuthBackend>,
    policy: CachePolicy,
    state: Mutex<CacheState>,
}

impl UserCache {
    #[must_use]
    pub fn new(backend: Arc<dyn AuthBackend>, policy: CachePolicy) -> Self {
        Self { backend, policy, state: Mutex::new(CacheState::default()) }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current user, from memory while fresh, otherwise from one shared fetch.
    ///
    /// # Errors
    ///
    /// Returns the backend error of the underlying fetch. Failed fetches are
    /// not cached.
    pub async fn get(&self) -> FetchResult {
        self.get_at(Instant::now()).await
    }

    pub(crate) async fn get_at(&self, now: Instant) -> FetchResult {
        self.read_at(now).await.1
    }

    /// Like [`UserCache::get`], also reporting the generation the value is from.
    pub(crate) async fn read(&self) -> Tracked {
        self.read_at(Instant::now()).await
    }

    async fn read_at(&self, now: Instant) -> Tracked {
        loop {
            let (generation, fetch_id, fetch) = match self.lookup(now) {
                Lookup::Fresh { generation, user } => return (generation, Ok(user)),
                Lookup::Pending { generation, fetch_id, fetch } => (generation, fetch_id, fetch),
            };
            let result = fetch.await;
            if self.complete(generation, fetch_id, &result, now) {
                return (generation, result);
            }
            debug!(generation, "session: discarding user fetch started before invalidation");
        }
    }

    fn lookup(&self, now: Instant) -> Lookup {
        let mut state = self.lock();
        state.collect_garbage(now, self.policy);
        let generation = state.generation;
        if let Some(user) = state.fresh(now, self.policy) {
            return Lookup::Fresh { generation, user };
        }
        if let Some((fetch_id, fetch)) = &state.in_flight {
            return Lookup::Pending { generation, fetch_id: *fetch_id, fetch: fetch.clone() };
        }

        state.next_fetch_id += 1;
        let fetch_id = state.next_fetch_id;
        let backend = Arc::clone(&self.backend);
        let fetch = async move {
            let user = backend.get_user().await?;
            Ok::<_, BackendError>(user.as_ref().map(User::from))
        }
        .boxed()
        .shared();
        state.in_flight = Some((fetch_id, fetch.clone()));
        debug!(generation, fetch_id, "session: fetching current user");
        Lookup::Pending { generation, fetch_id, fetch }
    }

    /// Record a finished fetch. Returns false when an invalidation happened
    /// while it was running.
    fn complete(&self, generation: u64, fetch_id: u64, result: &FetchResult, now: Instant) -> bool {
        let mut state = self.lock();
        if state.in_flight.as_ref().is_some_and(|(id, _)| *id == fetch_id) {
            state.in_flight = None;
        }
        if state.generation != generation {
            return false;
        }
        if let Ok(user) = result {
            state.entry = Some(Entry { user: user.clone(), fetched_at: now });
            state.invalidated = false;
        }
        true
    }

    /// Mark the entry stale and wait for a fresh read.
    ///
    /// # Errors
    ///
    /// Returns the backend error of the refetch.
    pub async fn invalidate(&self) -> FetchResult {
        self.invalidate_tracked().await.1
    }

    pub(crate) async fn invalidate_tracked(&self) -> Tracked {
        {
            let mut state = self.lock();
            state.generation += 1;
            state.invalidated = true;
            state.in_flight = None;
        }
        self.read().await
    }

    /// Bumped by every invalidation and removal.
    pub(crate) fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Drop the entry without refetching.
    pub fn remove(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.entry = None;
        state.invalidated = false;
        state.in_flight = None;
    }

    /// Last known value, fresh or stale. `None` when nothing is cached.
    #[must_use]
    pub fn peek(&self) -> Option<Option<User>> {
        self.peek_at(Instant::now())
    }

    pub(crate) fn peek_at(&self, now: Instant) -> Option<Option<User>> {
        let mut state = self.lock();
        state.collect_garbage(now, self.policy);
        state.entry.as_ref().map(|e| e.user.clone())
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
