//! Session mirror store.
//!
//! Client-held summary of whether a user is signed in. It has no network
//! behavior of its own; hydration, login and logout feed it.

use std::sync::Arc;

use picabot_auth::User;
use tokio::sync::watch;

/// Client-visible authentication summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<User>,
    /// Always equal to `user.is_some()`.
    pub is_authenticated: bool,
    /// True until the first `set_user`.
    pub is_loading: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            user: None,
            is_authenticated: false,
            is_loading: true,
        }
    }
}

/// Observable holder of the [`SessionState`].
#[derive(Debug, Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<SessionState>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Creates a store in the pre-hydration state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Sets the user and derived flags in one transition.
    pub fn set_user(&self, user: Option<User>) {
        self.tx.send_modify(|state| {
            state.is_authenticated = user.is_some();
            state.user = user;
            state.is_loading = false;
        });
    }

    /// Sets only the loading flag.
    pub fn set_loading(&self, loading: bool) {
        self.tx.send_if_modified(|state| {
            let changed = state.is_loading != loading;
            state.is_loading = loading;
            changed
        });
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.tx.borrow().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_authenticated
    }

    /// Subscribes to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }
}
