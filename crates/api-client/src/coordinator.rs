//! Single-flight token refresh
//!
//! The first request that needs a refresh moves the coordinator from `Idle`
//! to `Refreshing` and starts the one refresh call. Every request that needs
//! a refresh while that call is outstanding is queued instead of starting its
//! own. When the call settles, all of them get the same outcome.
//!
//! Transitions:
//! - Idle → Refreshing (first 401; refresh task spawned)
//! - Refreshing → Refreshing (further 401s join the queue)
//! - Refreshing → Idle on success (token stored, queue resumed FIFO, originator last)
//! - Refreshing → Idle on failure (queue failed FIFO, session ended, originator last)
//!
//! The refresh runs in its own task, so a caller that stops waiting cannot
//! leave the state stuck in `Refreshing`. The state lives behind a plain mutex
//! that is never held across an await.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use request_envelope::RetryMarker;
use session_auth::CredentialStore;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::refresher::TokenRefresher;
use crate::session::SessionGuard;

/// What a waiting request is resumed with: the new access token, or the
/// error the refresh failed with.
pub type RefreshOutcome = Result<String, session_auth::Error>;

/// A request suspended until the in-flight refresh settles.
///
/// Consumed by exactly one of `succeed` or `fail`.
pub struct PendingRequest {
    resume: oneshot::Sender<RefreshOutcome>,
}

impl PendingRequest {
    fn new() -> (Self, oneshot::Receiver<RefreshOutcome>) {
        let (resume, resumed) = oneshot::channel();
        (Self { resume }, resumed)
    }

    pub fn succeed(self, access_token: String) {
        // The waiter may have been dropped; nothing to resume then.
        let _ = self.resume.send(Ok(access_token));
    }

    pub fn fail(self, error: session_auth::Error) {
        let _ = self.resume.send(Err(error));
    }
}

enum RefreshState {
    Idle,
    Refreshing { queue: VecDeque<PendingRequest> },
}

/// Drives at most one refresh at a time and fans its outcome out.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    state: Mutex<RefreshState>,
    store: Arc<CredentialStore>,
    session: SessionGuard,
    refresher: Arc<dyn TokenRefresher>,
}

impl RefreshCoordinator {
    pub fn new(session: SessionGuard, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                state: Mutex::new(RefreshState::Idle),
                store: session.store().clone(),
                session,
                refresher,
            }),
        }
    }

    /// Wait for a new access token on behalf of a request that got a 401.
    ///
    /// Marks the attempt as retried, then either starts the refresh or joins
    /// the one already running. Resolves once that refresh settles.
    pub async fn recover(&self, marker: &mut RetryMarker) -> RefreshOutcome {
        marker.set();
        let (pending, resumed) = PendingRequest::new();

        let originator = {
            let mut state = self.inner.lock_state();
            match &mut *state {
                RefreshState::Refreshing { queue } => {
                    queue.push_back(pending);
                    debug!(queued = queue.len(), "refresh in flight, request queued");
                    None
                }
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing {
                        queue: VecDeque::new(),
                    };
                    Some(pending)
                }
            }
        };

        if let Some(originator) = originator {
            debug!("starting token refresh");
            let inner = self.inner.clone();
            tokio::spawn(async move { inner.run(originator).await });
        }

        resumed.await.unwrap_or_else(|_| {
            Err(session_auth::Error::Refresh(
                "refresh task ended without settling".into(),
            ))
        })
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(
            *self.inner.lock_state(),
            RefreshState::Refreshing { .. }
        )
    }

    /// Requests waiting behind the in-flight refresh, originator excluded.
    pub fn queued(&self) -> usize {
        match &*self.inner.lock_state() {
            RefreshState::Refreshing { queue } => queue.len(),
            RefreshState::Idle => 0,
        }
    }
}

impl CoordinatorInner {
    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the queue, leaving `Refreshing` with an empty one.
    fn take_queue(&self) -> VecDeque<PendingRequest> {
        match &mut *self.lock_state() {
            RefreshState::Refreshing { queue } => std::mem::take(queue),
            RefreshState::Idle => VecDeque::new(),
        }
    }

    /// Return to `Idle`, handing back anything still queued.
    fn settle(&self) -> VecDeque<PendingRequest> {
        match std::mem::replace(&mut *self.lock_state(), RefreshState::Idle) {
            RefreshState::Refreshing { queue } => queue,
            RefreshState::Idle => VecDeque::new(),
        }
    }

    async fn run(&self, originator: PendingRequest) {
        let credentials = self.store.get().await;
        let outcome = match credentials.refresh_token.as_deref() {
            Some(refresh) => self.refresher.refresh(refresh).await,
            None => Err(session_auth::Error::MissingRefreshToken),
        };

        match outcome {
            Ok(refreshed) => {
                let access_token = refreshed.access_token;
                self.store
                    .set_access_token(access_token.clone(), refreshed.refresh_token)
                    .await;
                metrics::record_refresh("success");

                let queue = self.settle();
                info!(resumed = queue.len() + 1, "token refresh succeeded");
                for pending in queue {
                    pending.succeed(access_token.clone());
                }
                originator.succeed(access_token);
            }
            Err(error) => {
                metrics::record_refresh("failure");

                let queue = self.take_queue();
                warn!(error = %error, rejected = queue.len() + 1, "token refresh failed");
                for pending in queue {
                    pending.fail(error.clone());
                }

                self.session
                    .invalidate(&format!("token refresh failed: {error}"))
                    .await;
                originator.fail(error.clone());

                // Requests that joined while the session was being torn down.
                for pending in self.settle() {
                    pending.fail(error.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresher::RefreshFuture;
    use session_auth::{
        CredentialPersistence, Credentials, MemoryPersistence, PersistFuture, RefreshedToken,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;
    use tokio::sync::broadcast::error::TryRecvError;

    /// Refresher that blocks until released, then returns a fixed outcome.
    struct GatedRefresher {
        calls: AtomicUsize,
        seen: std::sync::Mutex<Vec<String>>,
        gate: Notify,
        outcome: session_auth::Result<RefreshedToken>,
    }

    impl GatedRefresher {
        fn new(outcome: session_auth::Result<RefreshedToken>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                seen: std::sync::Mutex::new(Vec::new()),
                gate: Notify::new(),
                outcome,
            })
        }

        fn release(&self) {
            self.gate.notify_one();
        }
    }

    impl TokenRefresher for GatedRefresher {
        fn refresh<'a>(&'a self, refresh_token: &'a str) -> RefreshFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.seen.lock().unwrap().push(refresh_token.to_string());
                self.gate.notified().await;
                self.outcome.clone()
            })
        }
    }

    /// Memory persistence that counts clears.
    #[derive(Default)]
    struct CountingPersistence {
        inner: MemoryPersistence,
        clears: AtomicUsize,
    }

    impl CredentialPersistence for CountingPersistence {
        fn load(&self) -> PersistFuture<'_, Option<Credentials>> {
            self.inner.load()
        }

        fn save<'a>(&'a self, credentials: &'a Credentials) -> PersistFuture<'a, ()> {
            self.inner.save(credentials)
        }

        fn clear(&self) -> PersistFuture<'_, ()> {
            self.clears.fetch_add(1, Ordering::SeqCst);
            self.inner.clear()
        }
    }

    struct Harness {
        coordinator: RefreshCoordinator,
        session: SessionGuard,
        refresher: Arc<GatedRefresher>,
        persistence: Arc<CountingPersistence>,
    }

    async fn harness(
        credentials: Credentials,
        outcome: session_auth::Result<RefreshedToken>,
    ) -> Harness {
        let persistence = Arc::new(CountingPersistence::default());
        persistence.save(&credentials).await.unwrap();
        let store = Arc::new(CredentialStore::load(persistence.clone()).await.unwrap());
        let session = SessionGuard::new(store);
        let refresher = GatedRefresher::new(outcome);
        let coordinator = RefreshCoordinator::new(session.clone(), refresher.clone());
        Harness {
            coordinator,
            session,
            refresher,
            persistence,
        }
    }

    fn stale() -> Credentials {
        Credentials::signed_in("at_stale".into(), "rt_1".into())
    }

    fn fresh() -> session_auth::Result<RefreshedToken> {
        Ok(RefreshedToken {
            access_token: "at_fresh".into(),
            refresh_token: Some("rt_2".into()),
        })
    }

    /// Start `n` concurrent recoveries and wait until one refresh is running
    /// with the other `n - 1` queued behind it.
    async fn start_recoveries(
        coordinator: &RefreshCoordinator,
        refresher: &GatedRefresher,
        n: usize,
    ) -> Vec<tokio::task::JoinHandle<(RefreshOutcome, RetryMarker)>> {
        let handles: Vec<_> = (0..n)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    let mut marker = RetryMarker::default();
                    let outcome = coordinator.recover(&mut marker).await;
                    (outcome, marker)
                })
            })
            .collect();

        tokio::time::timeout(Duration::from_secs(5), async {
            while coordinator.queued() < n - 1 || refresher.calls.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("requests never queued behind the refresh");

        handles
    }

    #[tokio::test]
    async fn concurrent_failures_share_one_refresh() {
        let h = harness(stale(), fresh()).await;

        let handles = start_recoveries(&h.coordinator, &h.refresher, 3).await;
        assert!(h.coordinator.is_refreshing());
        h.refresher.release();

        for handle in handles {
            let (outcome, marker) = handle.await.unwrap();
            assert_eq!(outcome.unwrap(), "at_fresh");
            assert!(marker.is_set());
        }

        assert_eq!(h.refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*h.refresher.seen.lock().unwrap(), vec!["rt_1".to_string()]);
        assert!(!h.coordinator.is_refreshing());
        assert_eq!(h.coordinator.queued(), 0);
    }

    #[tokio::test]
    async fn success_stores_new_token_pair() {
        let h = harness(stale(), fresh()).await;

        let handles = start_recoveries(&h.coordinator, &h.refresher, 1).await;
        h.refresher.release();
        for handle in handles {
            handle.await.unwrap().0.unwrap();
        }

        let creds = h.session.store().get().await;
        assert_eq!(creds.access_token.as_deref(), Some("at_fresh"));
        assert_eq!(creds.refresh_token.as_deref(), Some("rt_2"));
        assert!(!h.session.is_ended());
    }

    #[tokio::test]
    async fn failure_rejects_everyone_and_ends_session_once() {
        let h = harness(
            stale(),
            Err(session_auth::Error::InvalidCredentials("revoked".into())),
        )
        .await;
        let mut events = h.session.subscribe();

        let handles = start_recoveries(&h.coordinator, &h.refresher, 4).await;
        h.refresher.release();

        for handle in handles {
            let (outcome, _) = handle.await.unwrap();
            assert_eq!(
                outcome.unwrap_err(),
                session_auth::Error::InvalidCredentials("revoked".into())
            );
        }

        assert_eq!(h.refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.persistence.clears.load(Ordering::SeqCst), 1);
        assert_eq!(h.session.store().get().await, Credentials::empty());
        assert!(matches!(
            events.try_recv(),
            Ok(crate::session::SessionEvent::Ended { .. })
        ));
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert!(!h.coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn failure_after_direct_sign_in_clears_and_notifies() {
        let h = harness(
            stale(),
            Err(session_auth::Error::InvalidCredentials("revoked".into())),
        )
        .await;
        h.session.invalidate("earlier failure").await;
        h.session
            .store()
            .set(Credentials::signed_in("at_2".into(), "rt_2".into()))
            .await;
        let mut events = h.session.subscribe();

        let handles = start_recoveries(&h.coordinator, &h.refresher, 1).await;
        h.refresher.release();
        for handle in handles {
            assert!(handle.await.unwrap().0.is_err());
        }

        assert_eq!(*h.refresher.seen.lock().unwrap(), vec!["rt_2".to_string()]);
        assert_eq!(h.session.store().get().await, Credentials::empty());
        assert!(matches!(
            events.try_recv(),
            Ok(crate::session::SessionEvent::Ended { .. })
        ));
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn missing_refresh_token_fails_without_calling_endpoint() {
        let h = harness(
            Credentials {
                access_token: Some("at_stale".into()),
                refresh_token: None,
                authenticated: true,
            },
            fresh(),
        )
        .await;

        let mut marker = RetryMarker::default();
        let outcome = h.coordinator.recover(&mut marker).await;

        assert_eq!(
            outcome.unwrap_err(),
            session_auth::Error::MissingRefreshToken
        );
        assert_eq!(h.refresher.calls.load(Ordering::SeqCst), 0);
        assert!(h.session.is_ended());
    }

    #[tokio::test]
    async fn episodes_are_independent() {
        let h = harness(stale(), fresh()).await;

        for _ in 0..2 {
            let handles = start_recoveries(&h.coordinator, &h.refresher, 2).await;
            h.refresher.release();
            for handle in handles {
                assert_eq!(handle.await.unwrap().0.unwrap(), "at_fresh");
            }
        }

        assert_eq!(h.refresher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            *h.refresher.seen.lock().unwrap(),
            vec!["rt_1".to_string(), "rt_2".to_string()],
            "second episode must use the rotated refresh token"
        );
    }

    #[tokio::test]
    async fn dropped_originator_does_not_strand_the_state() {
        let h = harness(stale(), fresh()).await;

        let originator = {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move {
                let mut marker = RetryMarker::default();
                coordinator.recover(&mut marker).await
            })
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            while h.refresher.calls.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
        originator.abort();

        h.refresher.release();
        tokio::time::timeout(Duration::from_secs(5), async {
            while h.coordinator.is_refreshing() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("coordinator must return to idle after the refresh settles");

        assert_eq!(
            h.session.store().get().await.access_token.as_deref(),
            Some("at_fresh")
        );
    }
}
