//! Client-side session state with single-flight refresh coordination.
//!
//! The store holds the current token pair plus a monotonically increasing
//! generation counter. Every successful refresh and every clear bumps the
//! generation. The refresh gate is an async mutex: concurrent callers that
//! all observed the same expired generation park on the gate, and whoever
//! acquires it first checks whether the generation already moved -- if so,
//! someone else completed the exchange and the parked caller reuses its
//! outcome. This is what guarantees at most one outstanding refresh
//! exchange per client process.
//!
//! The guard is process-local by design: independent processes/tabs each
//! run their own refresh.

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// The current credential pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Default)]
struct SessionState {
    session: Option<Session>,
    generation: u64,
}

/// Shared session storage for one client process.
///
/// Designed to be wrapped in `Arc` and shared between the API client and
/// the live subscription.
pub struct SessionStore {
    state: Mutex<SessionState>,
    /// Single-flight refresh gate; held only for the duration of one
    /// refresh exchange.
    refresh_gate: Mutex<()>,
}

impl SessionStore {
    /// Create an empty (signed-out) store.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::default()),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Create a store seeded with an existing session.
    pub fn with_session(session: Session) -> Self {
        Self {
            state: Mutex::new(SessionState {
                session: Some(session),
                generation: 0,
            }),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Current session (if signed in) and its generation.
    pub async fn snapshot(&self) -> (Option<Session>, u64) {
        let state = self.state.lock().await;
        (state.session.clone(), state.generation)
    }

    /// Install a new session (sign-in or successful refresh).
    pub async fn set(&self, session: Session) {
        let mut state = self.state.lock().await;
        state.session = Some(session);
        state.generation += 1;
    }

    /// Clear the session (sign-out or failed refresh).
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.session = None;
        state.generation += 1;
    }

    /// Acquire the single-flight refresh gate.
    pub(crate) async fn refresh_gate(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.refresh_gate.lock().await
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(n: u32) -> Session {
        Session {
            access_token: format!("access-{n}"),
            refresh_token: format!("refresh-{n}"),
        }
    }

    #[tokio::test]
    async fn set_and_clear_bump_the_generation() {
        let store = SessionStore::new();
        let (none, g0) = store.snapshot().await;
        assert!(none.is_none());

        store.set(session(1)).await;
        let (some, g1) = store.snapshot().await;
        assert_eq!(some, Some(session(1)));
        assert!(g1 > g0);

        store.clear().await;
        let (cleared, g2) = store.snapshot().await;
        assert!(cleared.is_none());
        assert!(g2 > g1);
    }

    #[tokio::test]
    async fn seeded_store_starts_signed_in() {
        let store = SessionStore::with_session(session(9));
        let (s, _) = store.snapshot().await;
        assert_eq!(s.unwrap().access_token, "access-9");
    }
}
