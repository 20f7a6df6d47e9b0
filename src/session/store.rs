//! Observable session store.
//!
//! DESIGN
//! ======
//! Constructed explicitly and shared by cloning. `start()` performs the first
//! load and attaches a listener to the backend's auth events; `dispose()`
//! detaches it. The listener holds only a weak reference, so dropping the last
//! store handle also ends it.
//!
//! STATE MACHINE
//! =============
//! `Uninitialized -> Loading -> Ready(user)`, then `Ready -> Loading -> Ready`
//! on every refetch. A failed fetch resolves to `Ready(None)`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::cache::{Tracked, UserCache};
use super::{SessionState, User};
use crate::backend::{AuthBackend, AuthEvent};
use crate::config::CachePolicy;

/// Aborts the listener task when dropped. Taken out of the store at most once.
struct ListenerGuard {
    handle: JoinHandle<()>,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.handle.abort();
        debug!("session: auth listener detached");
    }
}

struct StoreInner {
    backend: Arc<dyn AuthBackend>,
    cache: UserCache,
    state: watch::Sender<SessionState>,
    login_modal: watch::Sender<bool>,
    listener: Mutex<Option<ListenerGuard>>,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl SessionStore {
    #[must_use]
    pub fn new(backend: Arc<dyn AuthBackend>, policy: CachePolicy) -> Self {
        let cache = UserCache::new(Arc::clone(&backend), policy);
        let (state, _) = watch::channel(SessionState::Uninitialized);
        let (login_modal, _) = watch::channel(false);
        Self {
            inner: Arc::new(StoreInner { backend, cache, state, login_modal, listener: Mutex::new(None) }),
        }
    }

    fn listener(&self) -> MutexGuard<'_, Option<ListenerGuard>> {
        self.inner.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Attach the auth listener and perform the first load.
    pub async fn start(&self) -> Option<User> {
        self.attach_listener();
        let first_load = self.inner.state.send_if_modified(|state| {
            if matches!(state, SessionState::Uninitialized) {
                *state = SessionState::Loading;
                return true;
            }
            false
        });
        if first_load {
            let tracked = self.inner.cache.read().await;
            return publish_inner(&self.inner, tracked);
        }
        self.user()
    }

    fn attach_listener(&self) {
        let mut slot = self.listener();
        if slot.is_some() {
            return;
        }
        let events = self.inner.backend.subscribe();
        let weak = Arc::downgrade(&self.inner);
        *slot = Some(ListenerGuard { handle: tokio::spawn(listen(weak, events)) });
        debug!("session: auth listener attached");
    }

    /// Detach the auth listener. Returns false if it was not attached.
    pub fn dispose(&self) -> bool {
        let guard = self.listener().take();
        guard.is_some()
    }

    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listener().is_some()
    }

    // =========================================================================
    // READS
    // =========================================================================

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.inner.state.borrow().user().cloned()
    }

    /// Receiver for state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Last cached user without touching the backend.
    #[must_use]
    pub fn cached_user(&self) -> Option<User> {
        self.inner.cache.peek().flatten()
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    /// Invalidate the cached user and wait for a fresh read.
    pub async fn refetch(&self) -> Option<User> {
        refetch_inner(&self.inner).await
    }

    /// Drop the cached user and publish the signed-out state.
    pub fn clear(&self) {
        self.inner.cache.remove();
        self.inner.state.send_replace(SessionState::Ready(None));
        info!("session: cleared");
    }

    // =========================================================================
    // LOGIN MODAL
    // =========================================================================

    pub fn open_login_modal(&self) {
        self.inner.login_modal.send_replace(true);
    }

    pub fn close_login_modal(&self) {
        self.inner.login_modal.send_replace(false);
    }

    #[must_use]
    pub fn is_login_modal_open(&self) -> bool {
        *self.inner.login_modal.borrow()
    }

    #[must_use]
    pub fn subscribe_login_modal(&self) -> watch::Receiver<bool> {
        self.inner.login_modal.subscribe()
    }
}

async fn refetch_inner(inner: &StoreInner) -> Option<User> {
    inner.state.send_replace(SessionState::Loading);
    let tracked = inner.cache.invalidate_tracked().await;
    publish_inner(inner, tracked)
}

/// Publish a finished read unless the cache moved on (a `clear` or a newer
/// refetch) while it was in flight. The generation check and the send share
/// the watch lock, so a later `clear` always lands after it.
fn publish_inner(inner: &StoreInner, (generation, result): Tracked) -> Option<User> {
    let user = match result {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "session: current user fetch failed");
            None
        }
    };
    match &user {
        Some(u) => debug!(user_id = %u.id, "session: ready"),
        None => debug!("session: ready (signed out)"),
    }
    let published = inner.state.send_if_modified(|state| {
        if inner.cache.generation() != generation {
            return false;
        }
        *state = SessionState::Ready(user.clone());
        true
    });
    if published {
        user
    } else {
        debug!(generation, "session: dropping superseded user read");
        inner.state.borrow().user().cloned()
    }
}

async fn listen(store: Weak<StoreInner>, mut events: broadcast::Receiver<AuthEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "session: auth events lagged; refetching");
                None
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let Some(inner) = store.upgrade() else { break };
        match event {
            Some(AuthEvent::SignedIn(_) | AuthEvent::SignedOut) | None => {
                if let Some(event) = &event {
                    info!(event = event.name(), "session: auth state changed; refetching");
                }
                refetch_inner(&inner).await;
            }
            Some(other) => debug!(event = other.name(), "session: auth event ignored"),
        }
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
