//! Application-visible session state
//!
//! A single owned value with a broadcast subscription. Every transition goes
//! through `publish`, which requires the transition lock, so state changes and
//! the credential writes that accompany them are serialized.
//!
//! The session epoch increments whenever a session ends or a new one begins
//! (login, logout, forced logout). Work started under an older epoch (an
//! in-flight refresh, a profile fetch during restore) discards its result.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{Mutex, MutexGuard, broadcast};
use tracing::debug;
use tutor_auth::UserProfile;

/// Buffered transitions per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 16;

/// Session status without the user payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Unauthenticated => "unauthenticated",
            SessionStatus::Authenticating => "authenticating",
            SessionStatus::Authenticated => "authenticated",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current session. `Authenticated` always carries the user.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated(Arc<UserProfile>),
}

impl SessionState {
    pub fn status(&self) -> SessionStatus {
        match self {
            SessionState::Unauthenticated => SessionStatus::Unauthenticated,
            SessionState::Authenticating => SessionStatus::Authenticating,
            SessionState::Authenticated(_) => SessionStatus::Authenticated,
        }
    }

    pub fn user(&self) -> Option<&UserProfile> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }
}

pub(crate) type TransitionGuard<'a> = MutexGuard<'a, ()>;

pub(crate) struct Session {
    current: RwLock<SessionState>,
    events: broadcast::Sender<SessionState>,
    epoch: AtomicU64,
    transitions: Mutex<()>,
}

impl Session {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            current: RwLock::new(SessionState::Unauthenticated),
            events,
            epoch: AtomicU64::new(0),
            transitions: Mutex::new(()),
        }
    }

    pub(crate) fn current(&self) -> SessionState {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SessionState> {
        self.events.subscribe()
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Acquire the transition lock.
    pub(crate) async fn lock(&self) -> TransitionGuard<'_> {
        self.transitions.lock().await
    }

    /// Start a new epoch; returns it.
    pub(crate) fn advance_epoch(&self, _guard: &TransitionGuard<'_>) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Set the state and notify subscribers. No-op if unchanged.
    ///
    /// Returns whether the state changed.
    pub(crate) fn publish(&self, _guard: &TransitionGuard<'_>, next: SessionState) -> bool {
        {
            let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
            if *current == next {
                return false;
            }
            debug!(from = %current.status(), to = %next.status(), "session transition");
            *current = next.clone();
        }
        // No subscribers is fine
        let _ = self.events.send(next);
        true
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("status", &self.current().status())
            .field("epoch", &self.epoch())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Arc<UserProfile> {
        Arc::new(
            serde_json::from_value(serde_json::json!({
                "id": 7,
                "email": "student@example.com",
                "first_name": "Ada"
            }))
            .unwrap(),
        )
    }

    #[test]
    fn state_accessors() {
        let state = SessionState::Authenticated(user());
        assert_eq!(state.status(), SessionStatus::Authenticated);
        assert_eq!(state.user().unwrap().email, "student@example.com");
        assert!(state.is_authenticated());

        let state = SessionState::Authenticating;
        assert_eq!(state.status().to_string(), "authenticating");
        assert!(state.user().is_none());
        assert!(!state.is_authenticated());

        assert_eq!(SessionState::default(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn subscribers_see_every_transition_in_order() {
        let session = Session::new();
        let mut rx = session.subscribe();

        let guard = session.lock().await;
        assert!(session.publish(&guard, SessionState::Authenticating));
        assert!(session.publish(&guard, SessionState::Authenticated(user())));
        assert!(session.publish(&guard, SessionState::Unauthenticated));
        drop(guard);

        assert_eq!(rx.recv().await.unwrap(), SessionState::Authenticating);
        assert!(rx.recv().await.unwrap().is_authenticated());
        assert_eq!(rx.recv().await.unwrap(), SessionState::Unauthenticated);
        assert_eq!(session.current(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn unchanged_state_is_not_published() {
        let session = Session::new();
        let mut rx = session.subscribe();

        let guard = session.lock().await;
        assert!(!session.publish(&guard, SessionState::Unauthenticated));
        drop(guard);

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn publish_without_subscribers_still_updates_state() {
        let session = Session::new();
        let guard = session.lock().await;
        session.publish(&guard, SessionState::Authenticating);
        assert_eq!(session.current().status(), SessionStatus::Authenticating);
    }

    #[tokio::test]
    async fn epoch_advances_monotonically() {
        let session = Session::new();
        assert_eq!(session.epoch(), 0);
        let guard = session.lock().await;
        assert_eq!(session.advance_epoch(&guard), 1);
        assert_eq!(session.advance_epoch(&guard), 2);
        assert_eq!(session.epoch(), 2);
    }
}
