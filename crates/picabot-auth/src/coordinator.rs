//! Single-flight refresh coordination.
//!
//! When several authenticated requests fail with 401 at the same time, only
//! the first caller (the leader) runs the refresh. Everyone else joins the
//! round as a waiter and receives the leader's outcome.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use picabot_auth::RefreshCoordinator;
//!
//! let coordinator = Arc::new(RefreshCoordinator::new(Arc::new(refresher)));
//! coordinator.refresh().await?;
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{AuthError, AuthResult};
use crate::refresh::Refresher;

/// Default capacity of the waiter queue.
pub const DEFAULT_MAX_WAITERS: usize = 1024;

type Waiter = oneshot::Sender<AuthResult<()>>;

#[derive(Default)]
struct RoundState {
    is_refreshing: bool,
    waiters: VecDeque<Waiter>,
}

/// Result of one call to [`RefreshCoordinator::refresh_round`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    /// This caller ran the refresh; everyone else waited on it.
    pub led: bool,
    pub result: AuthResult<()>,
}

enum Role {
    Leader,
    Waiter(oneshot::Receiver<AuthResult<()>>),
}

/// Deduplicates concurrent refresh attempts.
///
/// Each instance owns its own state; construct one per client session and
/// inject it where it is needed.
pub struct RefreshCoordinator {
    refresher: Arc<dyn Refresher>,
    state: Mutex<RoundState>,
    max_waiters: usize,
    rounds: AtomicU64,
}

impl RefreshCoordinator {
    /// Creates a coordinator running rounds through `refresher`.
    pub fn new(refresher: Arc<dyn Refresher>) -> Self {
        Self {
            refresher,
            state: Mutex::new(RoundState::default()),
            max_waiters: DEFAULT_MAX_WAITERS,
            rounds: AtomicU64::new(0),
        }
    }

    /// Sets the waiter queue capacity. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_waiters(mut self, max_waiters: usize) -> Self {
        self.max_waiters = max_waiters.max(1);
        self
    }

    /// Whether a refresh round is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.lock().is_refreshing
    }

    /// Number of callers waiting on the in-flight round.
    pub fn pending_waiters(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Number of rounds started so far.
    pub fn rounds_started(&self) -> u64 {
        self.rounds.load(Ordering::Relaxed)
    }

    /// Refreshes, or waits for the refresh already in flight.
    ///
    /// All callers of one round observe the same outcome.
    ///
    /// # Errors
    ///
    /// Returns the refresher's error, `AuthError::RefreshQueueFull` when the
    /// waiter queue is at capacity, or `AuthError::RefreshFailed` if the
    /// round was abandoned before it completed.
    pub async fn refresh(&self) -> AuthResult<()> {
        self.refresh_round().await.result
    }

    /// Like [`refresh`](Self::refresh), but also reports whether this caller
    /// led the round. Exactly one caller per round sees `led == true`, which
    /// makes it the place for once-per-round side effects.
    pub async fn refresh_round(&self) -> RoundOutcome {
        let role = match self.join() {
            Ok(role) => role,
            Err(e) => {
                return RoundOutcome {
                    led: false,
                    result: Err(e),
                };
            }
        };

        match role {
            Role::Waiter(rx) => RoundOutcome {
                led: false,
                result: rx
                    .await
                    .unwrap_or_else(|_| Err(AuthError::refresh_failed("refresh abandoned"))),
            },
            Role::Leader => {
                let round = self.rounds.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(round, "Refresh round started");

                let guard = RoundGuard {
                    coordinator: self,
                    completed: false,
                };
                let outcome = self.refresher.refresh().await;
                guard.complete(&outcome);
                RoundOutcome {
                    led: true,
                    result: outcome,
                }
            }
        }
    }

    fn join(&self) -> AuthResult<Role> {
        let mut state = self.lock();

        if !state.is_refreshing {
            state.is_refreshing = true;
            return Ok(Role::Leader);
        }

        if state.waiters.len() >= self.max_waiters {
            warn!(capacity = self.max_waiters, "Refresh queue full");
            return Err(AuthError::RefreshQueueFull {
                capacity: self.max_waiters,
            });
        }

        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(tx);
        debug!(position = state.waiters.len(), "Joined in-flight refresh");
        Ok(Role::Waiter(rx))
    }

    /// Fans `outcome` out to every waiter in FIFO order and returns to idle.
    fn complete(&self, outcome: &AuthResult<()>) {
        let mut state = self.lock();
        let waiters = std::mem::take(&mut state.waiters);
        let count = waiters.len();

        for waiter in waiters {
            // A dropped receiver means the caller lost interest.
            let _ = waiter.send(outcome.clone());
        }
        state.is_refreshing = false;

        match outcome {
            Ok(()) => info!(waiters = count, "Refresh round succeeded"),
            Err(e) => warn!(waiters = count, error = %e, "Refresh round failed"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RoundState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("RefreshCoordinator")
            .field("is_refreshing", &state.is_refreshing)
            .field("waiters", &state.waiters.len())
            .field("max_waiters", &self.max_waiters)
            .finish()
    }
}

/// Finishes the round if the leader's future is dropped mid-refresh.
struct RoundGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    completed: bool,
}

impl RoundGuard<'_> {
    fn complete(mut self, outcome: &AuthResult<()>) {
        self.completed = true;
        self.coordinator.complete(outcome);
    }
}

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.coordinator
                .complete(&Err(AuthError::refresh_failed("refresh abandoned")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Semaphore;

    /// Refresher that blocks until released and counts its calls.
    struct GatedRefresher {
        gate: Semaphore,
        calls: AtomicUsize,
        outcome: AuthResult<()>,
    }

    impl GatedRefresher {
        fn new(outcome: AuthResult<()>) -> Arc<Self> {
            Arc::new(Self {
                gate: Semaphore::new(0),
                calls: AtomicUsize::new(0),
                outcome,
            })
        }

        fn release(&self) {
            self.gate.add_permits(1);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Refresher for GatedRefresher {
        async fn refresh(&self) -> AuthResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| AuthError::refresh_failed("gate closed"))?;
            permit.forget();
            self.outcome.clone()
        }
    }

    async fn wait_until(cond: impl Fn() -> bool) {
        while !cond() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_single_caller_refreshes() {
        let refresher = GatedRefresher::new(Ok(()));
        refresher.release();
        let coordinator = RefreshCoordinator::new(refresher.clone());

        coordinator.refresh().await.unwrap();
        assert_eq!(refresher.calls(), 1);
        assert!(!coordinator.is_refreshing());
        assert_eq!(coordinator.rounds_started(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let refresher = GatedRefresher::new(Ok(()));
        let coordinator = Arc::new(RefreshCoordinator::new(refresher.clone()));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let c = coordinator.clone();
                tokio::spawn(async move { c.refresh().await })
            })
            .collect();

        wait_until(|| coordinator.pending_waiters() == 4).await;
        assert!(coordinator.is_refreshing());
        refresher.release();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(()));
        }
        assert_eq!(refresher.calls(), 1);
        assert!(!coordinator.is_refreshing());
        assert_eq!(coordinator.pending_waiters(), 0);
    }

    #[tokio::test]
    async fn test_failure_fans_out_and_resets() {
        let refresher = GatedRefresher::new(Err(AuthError::refresh_failed("revoked")));
        let coordinator = Arc::new(RefreshCoordinator::new(refresher.clone()));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let c = coordinator.clone();
                tokio::spawn(async move { c.refresh().await })
            })
            .collect();

        wait_until(|| coordinator.pending_waiters() == 2).await;
        refresher.release();

        for handle in handles {
            assert_eq!(
                handle.await.unwrap(),
                Err(AuthError::refresh_failed("revoked"))
            );
        }
        assert!(!coordinator.is_refreshing());

        // A later caller starts a fresh round.
        refresher.release();
        assert!(coordinator.refresh().await.is_err());
        assert_eq!(refresher.calls(), 2);
        assert_eq!(coordinator.rounds_started(), 2);
    }

    #[tokio::test]
    async fn test_waiters_resolve_in_fifo_order() {
        let refresher = GatedRefresher::new(Ok(()));
        let coordinator = Arc::new(RefreshCoordinator::new(refresher.clone()));
        let order = Arc::new(Mutex::new(Vec::new()));

        let leader = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.refresh().await })
        };
        wait_until(|| coordinator.is_refreshing()).await;

        let mut waiters = Vec::new();
        for id in 1..=3 {
            let c = coordinator.clone();
            let order = order.clone();
            waiters.push(tokio::spawn(async move {
                let result = c.refresh().await;
                order.lock().unwrap().push(id);
                result
            }));
            wait_until(|| coordinator.pending_waiters() == id).await;
        }

        refresher.release();
        leader.await.unwrap().unwrap();
        for waiter in waiters {
            waiter.await.unwrap().unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_queue_capacity() {
        let refresher = GatedRefresher::new(Ok(()));
        let coordinator =
            Arc::new(RefreshCoordinator::new(refresher.clone()).with_max_waiters(1));

        let leader = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.refresh().await })
        };
        wait_until(|| coordinator.is_refreshing()).await;

        let waiter = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.refresh().await })
        };
        wait_until(|| coordinator.pending_waiters() == 1).await;

        assert_eq!(
            coordinator.refresh().await,
            Err(AuthError::RefreshQueueFull { capacity: 1 })
        );

        refresher.release();
        assert!(leader.await.unwrap().is_ok());
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_only_leader_reports_led() {
        let refresher = GatedRefresher::new(Err(AuthError::refresh_failed("revoked")));
        let coordinator = Arc::new(RefreshCoordinator::new(refresher.clone()));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let c = coordinator.clone();
                tokio::spawn(async move { c.refresh_round().await })
            })
            .collect();

        wait_until(|| coordinator.pending_waiters() == 2).await;
        refresher.release();

        let mut leaders = 0;
        for handle in handles {
            let round = handle.await.unwrap();
            assert_eq!(round.result, Err(AuthError::refresh_failed("revoked")));
            if round.led {
                leaders += 1;
            }
        }
        assert_eq!(leaders, 1);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let refresher = GatedRefresher::new(Ok(()));
        let coordinator = RefreshCoordinator::new(refresher).with_max_waiters(0);
        assert_eq!(coordinator.max_waiters, 1);
    }

    #[tokio::test]
    async fn test_abandoned_leader_releases_waiters() {
        let refresher = GatedRefresher::new(Ok(()));
        let coordinator = Arc::new(RefreshCoordinator::new(refresher.clone()));

        let leader = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.refresh().await })
        };
        wait_until(|| coordinator.is_refreshing()).await;

        let waiter = {
            let c = coordinator.clone();
            tokio::spawn(async move { c.refresh().await })
        };
        wait_until(|| coordinator.pending_waiters() == 1).await;

        leader.abort();
        assert_eq!(
            waiter.await.unwrap(),
            Err(AuthError::refresh_failed("refresh abandoned"))
        );
        assert!(!coordinator.is_refreshing());
    }
}
