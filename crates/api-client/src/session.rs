//! Session boundary
//!
//! Ending a session always clears the credential store and tells the outside
//! world once. However many requests fail together, subscribers see a single
//! `SessionEvent::Ended`. A later invalidation notifies again only when a new
//! session was started in between, through `establish` or by installing
//! signed-in credentials on the store directly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use session_auth::{CredentialStore, Credentials};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};

use crate::metrics;

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Credentials were cleared; the user has to sign in again.
    Ended { reason: String },
}

/// Owner of the "session ended" latch and its notification channel.
#[derive(Clone)]
pub struct SessionGuard {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    store: Arc<CredentialStore>,
    ended: AtomicBool,
    /// Makes clear-then-check-latch one step across concurrent invalidations.
    invalidating: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionGuard {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(SessionInner {
                store,
                ended: AtomicBool::new(false),
                invalidating: Mutex::new(()),
                events,
            }),
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.inner.store
    }

    /// Receive future session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Set by `invalidate`, reset by `establish`.
    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::Acquire)
    }

    /// Install credentials for a new session and re-arm the latch.
    pub async fn establish(&self, credentials: Credentials) {
        self.inner.store.set(credentials).await;
        self.inner.ended.store(false, Ordering::Release);
        info!("session established");
    }

    /// End the session: clear credentials, then notify subscribers.
    ///
    /// The store is always cleared. The event is sent, and `true` returned,
    /// unless the session had already ended and nobody signed in since.
    pub async fn invalidate(&self, reason: &str) -> bool {
        let _invalidating = self.inner.invalidating.lock().await;
        let cleared_signed_in = self.inner.store.clear().await;
        let already_ended = self.inner.ended.swap(true, Ordering::AcqRel);
        if already_ended && !cleared_signed_in {
            debug!(reason, "session already ended, suppressing duplicate invalidation");
            return false;
        }

        metrics::record_session_ended();
        info!(reason, "session ended");

        // No subscribers is fine; the latch still records the end.
        let _ = self.inner.events.send(SessionEvent::Ended {
            reason: reason.to_string(),
        });
        true
    }
}
