//! Fixed-size pool of expensive, stateful fetch sessions.
//!
//! A [`SessionPool`] eagerly creates `size` sessions through a
//! [`SessionBackend`] and hands them out as [`PooledSession`] guards.
//! Availability is tracked by a semaphore whose permit count always equals
//! the number of idle sessions, so an acquire waits on the semaphore (with
//! a deadline) and then pops an idle session.
//!
//! Returning a session always goes through the same recycle path: the
//! backend sanitises it (clearing cookies and similar state) and it is
//! requeued. A sanitisation failure still requeues the session; only a
//! [`SessionError::Broken`] session is destroyed, and it is not replaced,
//! so the pool shrinks and an error event is logged.
//!
//! Recycling runs in a detached task. A caller that is cancelled while its
//! session is being sanitised therefore cannot lose the session, and a
//! guard dropped without an explicit release (timeout, abort, panic)
//! schedules the same recycle.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::error::{SearchError, SessionError};

/// Creates, sanitises, and destroys the sessions held by a [`SessionPool`].
///
/// How a session is actually built (a headless browser, a cookie-jar HTTP
/// client, ...) is entirely up to the implementor.
#[async_trait]
pub trait SessionBackend: Send + Sync + 'static {
    /// The session handle handed to source adapters.
    type Session: Send + 'static;

    /// Create a new session.
    async fn create(&self) -> Result<Self::Session, SessionError>;

    /// Clear session-local state before the session is reused.
    ///
    /// Return [`SessionError::Sanitize`] if clearing failed but the session
    /// is still usable, or [`SessionError::Broken`] if it must be discarded.
    async fn sanitize(&self, session: &mut Self::Session) -> Result<(), SessionError>;

    /// Tear a session down. The default simply drops it.
    async fn destroy(&self, session: Self::Session) {
        drop(session);
    }
}

struct Slot<S> {
    id: usize,
    session: S,
}

struct Inner<B: SessionBackend> {
    backend: B,
    idle: Mutex<Vec<Slot<B::Session>>>,
    available: Semaphore,
    capacity: usize,
    live: AtomicUsize,
    acquire_timeout: Duration,
}

impl<B: SessionBackend> Inner<B> {
    fn idle(&self) -> MutexGuard<'_, Vec<Slot<B::Session>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make a session available again. Hands the slot back if the pool has
    /// been shut down in the meantime.
    fn put_back(&self, slot: Slot<B::Session>) -> Option<Slot<B::Session>> {
        let mut idle = self.idle();
        if self.available.is_closed() {
            return Some(slot);
        }
        idle.push(slot);
        drop(idle);
        self.available.add_permits(1);
        None
    }

    async fn discard(&self, slot: Slot<B::Session>) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.backend.destroy(slot.session).await;
    }
}

async fn recycle<B: SessionBackend>(inner: Arc<Inner<B>>, mut slot: Slot<B::Session>) {
    if inner.available.is_closed() {
        tracing::debug!(
            session = slot.id,
            "pool closed, destroying returned session"
        );
        inner.discard(slot).await;
        return;
    }

    match inner.backend.sanitize(&mut slot.session).await {
        Ok(()) => {}
        Err(SessionError::Broken(reason)) => {
            inner.discard(slot).await;
            tracing::error!(
                %reason,
                live = inner.live.load(Ordering::SeqCst),
                capacity = inner.capacity,
                "session discarded, pool shrunk"
            );
            return;
        }
        Err(err) => {
            tracing::warn!(
                session = slot.id,
                error = %err,
                "session sanitisation failed, requeueing"
            );
        }
    }

    let id = slot.id;
    if let Some(slot) = inner.put_back(slot) {
        inner.discard(slot).await;
    } else {
        tracing::trace!(session = id, "session returned to pool");
    }
}

/// A fixed-size pool of fetch sessions. Cheap to clone.
pub struct SessionPool<B: SessionBackend> {
    inner: Arc<Inner<B>>,
}

impl<B: SessionBackend> Clone for SessionPool<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: SessionBackend> fmt::Debug for SessionPool<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPool")
            .field("capacity", &self.capacity())
            .field("live", &self.live())
            .field("available", &self.available())
            .finish()
    }
}

impl<B: SessionBackend> SessionPool<B> {
    /// Create the pool and eagerly open exactly `size` sessions.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if `size` is zero, or
    /// [`SearchError::PoolInit`] if any session cannot be created; sessions
    /// created before the failure are destroyed.
    pub async fn new(
        backend: B,
        size: usize,
        acquire_timeout: Duration,
    ) -> Result<Self, SearchError> {
        if size == 0 {
            return Err(SearchError::Config(
                "pool size must be greater than 0".into(),
            ));
        }

        let started = Instant::now();
        let mut slots = Vec::with_capacity(size);
        for id in 0..size {
            match backend.create().await {
                Ok(session) => slots.push(Slot { id, session }),
                Err(err) => {
                    tracing::error!(
                        created = slots.len(),
                        size,
                        error = %err,
                        "session pool initialisation failed"
                    );
                    for slot in slots {
                        backend.destroy(slot.session).await;
                    }
                    return Err(SearchError::PoolInit(err.to_string()));
                }
            }
        }

        tracing::info!(
            size,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "session pool initialised"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                backend,
                idle: Mutex::new(slots),
                available: Semaphore::new(size),
                capacity: size,
                live: AtomicUsize::new(size),
                acquire_timeout,
            }),
        })
    }

    /// Acquire a session, waiting at most the pool's default acquire timeout.
    ///
    /// # Errors
    ///
    /// See [`SessionPool::acquire_within`].
    pub async fn acquire(&self) -> Result<PooledSession<B>, SearchError> {
        self.acquire_within(self.inner.acquire_timeout).await
    }

    /// Acquire a session, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::PoolExhausted`] if no session frees up in
    /// time, or [`SearchError::PoolClosed`] after [`SessionPool::shutdown`].
    pub async fn acquire_within(&self, timeout: Duration) -> Result<PooledSession<B>, SearchError> {
        let started = Instant::now();
        let permit = match tokio::time::timeout(timeout, self.inner.available.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(SearchError::PoolClosed),
            Err(_) => {
                let waited_ms = started.elapsed().as_millis() as u64;
                tracing::warn!(
                    waited_ms,
                    live = self.live(),
                    "no session available in pool"
                );
                return Err(SearchError::PoolExhausted { waited_ms });
            }
        };
        // The permit now belongs to the popped session; it is restored when
        // the session is put back.
        permit.forget();

        let Some(slot) = self.inner.idle().pop() else {
            return Err(SearchError::Internal(
                "session pool permit granted with no idle session".into(),
            ));
        };
        tracing::trace!(session = slot.id, "session acquired");

        Ok(PooledSession {
            slot: Some(slot),
            pool: Arc::clone(&self.inner),
        })
    }

    /// Return a session to the pool, sanitising it first.
    ///
    /// Always succeeds. Equivalent to [`PooledSession::release`].
    pub async fn release(&self, session: PooledSession<B>) {
        session.release().await;
    }

    /// Close the pool to new acquisitions and destroy every idle session.
    ///
    /// Sessions still checked out are destroyed when they are returned.
    pub async fn shutdown(&self) {
        self.inner.available.close();
        let drained: Vec<_> = self.inner.idle().drain(..).collect();
        let count = drained.len();
        for slot in drained {
            self.inner.discard(slot).await;
        }
        tracing::info!(destroyed = count, "session pool shut down");
    }

    /// Number of sessions created at startup.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Sessions not yet discarded (idle or checked out).
    pub fn live(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Sessions idle right now.
    pub fn available(&self) -> usize {
        self.inner.available.available_permits()
    }

    /// Whether [`SessionPool::shutdown`] has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.available.is_closed()
    }
}

/// Exclusive handle to one pooled session.
///
/// Dereferences to the backend's session type. Returned to the pool by
/// [`PooledSession::release`] or, failing that, when dropped.
pub struct PooledSession<B: SessionBackend> {
    slot: Option<Slot<B::Session>>,
    pool: Arc<Inner<B>>,
}

impl<B: SessionBackend> PooledSession<B> {
    /// Pool-local identifier of the underlying session.
    pub fn id(&self) -> usize {
        self.slot.as_ref().map_or(usize::MAX, |slot| slot.id)
    }

    /// Return the session to the pool and wait until it is available again
    /// (or discarded).
    pub async fn release(mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        let handle = tokio::spawn(recycle(Arc::clone(&self.pool), slot));
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "session recycle task failed");
        }
    }
}

impl<B: SessionBackend> Deref for PooledSession<B> {
    type Target = B::Session;

    fn deref(&self) -> &Self::Target {
        match self.slot.as_ref() {
            Some(slot) => &slot.session,
            // The slot is only taken by `release` (which consumes the guard) and `drop`.
            None => unreachable!("pooled session used after release"),
        }
    }
}

impl<B: SessionBackend> DerefMut for PooledSession<B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.slot.as_mut() {
            Some(slot) => &mut slot.session,
            None => unreachable!("pooled session used after release"),
        }
    }
}

impl<B: SessionBackend> Drop for PooledSession<B> {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(
                    session = slot.id,
                    "session dropped without release, recycling"
                );
                handle.spawn(recycle(Arc::clone(&self.pool), slot));
            }
            Err(_) => {
                tracing::warn!(
                    session = slot.id,
                    "session dropped outside runtime, requeueing unsanitised"
                );
                if let Some(slot) = self.pool.put_back(slot) {
                    self.pool.live.fetch_sub(1, Ordering::SeqCst);
                    drop(slot);
                }
            }
        }
    }
}

impl<B: SessionBackend> fmt::Debug for PooledSession<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledSession")
            .field("id", &self.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicBool;

    /// Session that records whether two holders ever overlap.
    struct TestSession {
        in_use: Arc<AtomicBool>,
        cookies: Vec<String>,
        broken: bool,
    }

    #[derive(Default)]
    struct TestBackend {
        created: AtomicUsize,
        destroyed: Arc<AtomicUsize>,
        fail_create_at: Option<usize>,
        sanitize_error: bool,
    }

    #[async_trait]
    impl SessionBackend for TestBackend {
        type Session = TestSession;

        async fn create(&self) -> Result<TestSession, SessionError> {
            let n = self.created.fetch_add(1, Ordering::SeqCst);
            if self.fail_create_at == Some(n) {
                return Err(SessionError::Create("renderer failed to start".into()));
            }
            Ok(TestSession {
                in_use: Arc::new(AtomicBool::new(false)),
                cookies: Vec::new(),
                broken: false,
            })
        }

        async fn sanitize(&self, session: &mut TestSession) -> Result<(), SessionError> {
            if session.broken {
                return Err(SessionError::Broken("renderer crashed".into()));
            }
            session.cookies.clear();
            if self.sanitize_error {
                return Err(SessionError::Sanitize("cookie store locked".into()));
            }
            Ok(())
        }

        async fn destroy(&self, _session: TestSession) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn make_pool(size: usize) -> SessionPool<TestBackend> {
        SessionPool::new(TestBackend::default(), size, Duration::from_millis(200))
            .await
            .expect("pool")
    }

    #[tokio::test]
    async fn creates_exactly_pool_size_sessions() {
        let pool = make_pool(4).await;
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.live(), 4);
        assert_eq!(pool.available(), 4);
        assert_eq!(pool.inner.backend.created.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn zero_size_rejected() {
        let err = SessionPool::new(TestBackend::default(), 0, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Config(_)));
    }

    #[tokio::test]
    async fn partial_init_failure_aborts_and_cleans_up() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let backend = TestBackend {
            fail_create_at: Some(2),
            destroyed: Arc::clone(&destroyed),
            ..Default::default()
        };
        let err = SessionPool::new(backend, 5, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::PoolInit(_)));
        assert_eq!(destroyed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn acquire_times_out_when_exhausted() {
        let pool = make_pool(1).await;
        let held = pool.acquire().await.expect("first acquire");
        let err = pool
            .acquire_within(Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::PoolExhausted { .. }));
        pool.release(held).await;
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn waiting_acquire_gets_released_session() {
        let pool = make_pool(1).await;
        let held = pool.acquire().await.expect("acquire");
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.acquire_within(Duration::from_secs(2)).await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.release(held).await;
        let got = waiter.await.expect("join");
        assert!(got.is_ok());
    }

    #[tokio::test]
    async fn release_sanitises_state() {
        let pool = make_pool(1).await;
        let mut session = pool.acquire().await.expect("acquire");
        session.cookies.push("sid=42".into());
        pool.release(session).await;
        let session = pool.acquire().await.expect("reacquire");
        assert!(session.cookies.is_empty());
    }

    #[tokio::test]
    async fn sanitize_failure_still_requeues() {
        let backend = TestBackend {
            sanitize_error: true,
            ..Default::default()
        };
        let pool = SessionPool::new(backend, 2, Duration::from_millis(50))
            .await
            .expect("pool");
        let session = pool.acquire().await.expect("acquire");
        pool.release(session).await;
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.live(), 2);
    }

    #[tokio::test]
    async fn broken_session_shrinks_pool() {
        let pool = make_pool(3).await;
        let mut session = pool.acquire().await.expect("acquire");
        session.broken = true;
        pool.release(session).await;
        assert_eq!(pool.live(), 2);
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.inner.backend.destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_guard_is_recycled() {
        let pool = make_pool(1).await;
        {
            let mut session = pool.acquire().await.expect("acquire");
            session.cookies.push("tracking=1".into());
        }
        let session = pool
            .acquire_within(Duration::from_secs(1))
            .await
            .expect("recycled session");
        assert!(session.cookies.is_empty());
    }

    #[tokio::test]
    async fn aborted_holder_releases_session() {
        let pool = make_pool(1).await;
        let task = {
            let pool = pool.clone();
            tokio::spawn(async move {
                let _session = pool.acquire().await.expect("acquire");
                tokio::time::sleep(Duration::from_secs(60)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pool.available(), 0);
        task.abort();
        let _ = task.await;
        assert!(pool.acquire_within(Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_round_trips_never_share_or_leak() {
        let size = 4;
        let pool = make_pool(size).await;
        let mut tasks = Vec::new();
        for _ in 0..size * 8 {
            let pool = pool.clone();
            tasks.push(tokio::spawn(async move {
                let session = pool
                    .acquire_within(Duration::from_secs(5))
                    .await
                    .expect("acquire");
                let was_in_use = session.in_use.swap(true, Ordering::SeqCst);
                assert!(!was_in_use, "session handed to two holders");
                let id = session.id();
                tokio::time::sleep(Duration::from_millis(2)).await;
                session.in_use.store(false, Ordering::SeqCst);
                pool.release(session).await;
                id
            }));
        }
        let mut seen = HashSet::new();
        for task in tasks {
            seen.insert(task.await.expect("join"));
        }
        assert!(seen.len() <= size);
        assert_eq!(pool.available(), size);
        assert_eq!(pool.live(), size);
    }

    #[tokio::test]
    async fn shutdown_destroys_idle_and_rejects_acquire() {
        let pool = make_pool(3).await;
        let held = pool.acquire().await.expect("acquire");
        pool.shutdown().await;
        assert!(pool.is_closed());
        assert_eq!(pool.inner.backend.destroyed.load(Ordering::SeqCst), 2);
        assert!(matches!(
            pool.acquire().await.unwrap_err(),
            SearchError::PoolClosed
        ));
        pool.release(held).await;
        assert_eq!(pool.inner.backend.destroyed.load(Ordering::SeqCst), 3);
        assert_eq!(pool.live(), 0);
    }
}
