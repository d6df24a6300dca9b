//! Refresh coordinator state machine
//!
//! Pure state machine: receives events, returns (new_state, action). The
//! session client executes the I/O implied by each action (refresh call,
//! replays, failing waiters).
//!
//! States:
//! - `Idle`: no refresh in flight
//! - `Refreshing { epoch, queue, next }`: one refresh call in flight, started
//!   while the session was at `epoch`; `queue` holds every request waiting on
//!   it, `next` holds auth failures from a later session (after a login) that
//!   need a refresh of their own once this one settles
//!
//! Transitions:
//! - Idle → Refreshing (first auth failure; the one refresh call starts)
//! - Idle → Idle (auth failure for a credential that was already replaced; replay now)
//! - Refreshing → Refreshing (further auth failures join the queue, or `next`
//!   when they belong to a later session)
//! - Refreshing → Refreshing (logout; queue released, call still settles)
//! - Refreshing → Idle (refresh settled: replay, expire, or abandon the queue)
//! - Refreshing → Refreshing (refresh settled with `next` waiting: settle the
//!   queue, then start the later session's refresh)

use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::error::Result;
use crate::request::{ApiRequest, ApiResponse};

/// A request parked until the in-flight refresh settles.
///
/// `settle` delivers the request's single outcome to its caller; `span` is the
/// caller's request span so the replay logs under the same `request_id`.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub request: ApiRequest,
    pub settle: oneshot::Sender<Result<ApiResponse>>,
    pub span: tracing::Span,
}

impl PendingRequest {
    pub(crate) fn new(request: ApiRequest) -> (Self, oneshot::Receiver<Result<ApiResponse>>) {
        let (settle, rx) = oneshot::channel();
        let span = tracing::Span::current();
        (
            Self {
                request,
                settle,
                span,
            },
            rx,
        )
    }

    /// Resolve with an error. The caller may have gone away; that is fine.
    pub(crate) fn fail(self, err: crate::Error) {
        let _ = self.settle.send(Err(err));
    }
}

/// How an in-flight refresh ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshOutcome {
    /// New credential stored
    Succeeded,
    /// Refresh rejected or impossible; session cleared
    Failed,
    /// Session changed (logout, new login) while the call was in flight;
    /// result discarded
    Superseded,
}

impl RefreshOutcome {
    pub(crate) fn label(self) -> &'static str {
        match self {
            RefreshOutcome::Succeeded => "succeeded",
            RefreshOutcome::Failed => "failed",
            RefreshOutcome::Superseded => "superseded",
        }
    }
}

#[derive(Debug, Default)]
pub(crate) enum RefreshState {
    #[default]
    Idle,
    Refreshing {
        epoch: u64,
        queue: Vec<PendingRequest>,
        next: Option<Deferred>,
    },
}

/// Auth failures from a session that started after the in-flight refresh.
#[derive(Debug)]
pub(crate) struct Deferred {
    pub epoch: u64,
    pub queue: Vec<PendingRequest>,
}

/// Events that drive coordinator transitions.
#[derive(Debug)]
pub(crate) enum RefreshEvent {
    /// A request got a 401 (or its credential is about to expire).
    ///
    /// `credential_changed` is true when the store holds a different credential
    /// than the one the request was sent with; `epoch` is the current session epoch.
    AuthFailed {
        pending: PendingRequest,
        credential_changed: bool,
        epoch: u64,
    },
    /// The refresh call settled and its result was committed (or discarded).
    Settled(RefreshOutcome),
    /// The user logged out.
    LoggedOut,
}

/// Actions the caller should execute after a transition.
#[derive(Debug)]
pub(crate) enum RefreshAction {
    /// Spawn the single refresh call for the session at `epoch`
    StartRefresh { epoch: u64 },
    /// Request joined the in-flight refresh; wait for it
    Queued { position: usize },
    /// Credential already replaced by an earlier refresh; replay with it
    ReplayNow(PendingRequest),
    /// Refresh succeeded; replay each request in queue order
    Replay(Vec<PendingRequest>),
    /// Refresh failed; session already cleared, fail every request
    Expire(Vec<PendingRequest>),
    /// Session changed underneath the refresh; fail every request
    Abandon(Vec<PendingRequest>),
    /// Carry out `settled` for the finished refresh, then spawn the refresh
    /// for the session at `epoch`
    Restart {
        settled: Box<RefreshAction>,
        epoch: u64,
    },
    /// No-op
    None,
}

/// Handle a coordinator transition. Pure function: no I/O.
pub(crate) fn handle_event(
    state: RefreshState,
    event: RefreshEvent,
) -> (RefreshState, RefreshAction) {
    match (state, event) {
        // --- Idle ---
        (
            RefreshState::Idle,
            RefreshEvent::AuthFailed {
                pending,
                credential_changed: true,
                ..
            },
        ) => (RefreshState::Idle, RefreshAction::ReplayNow(pending)),

        (
            RefreshState::Idle,
            RefreshEvent::AuthFailed {
                pending,
                credential_changed: false,
                epoch,
            },
        ) => (
            RefreshState::Refreshing {
                epoch,
                queue: vec![pending],
                next: None,
            },
            RefreshAction::StartRefresh { epoch },
        ),

        (RefreshState::Idle, RefreshEvent::Settled(_) | RefreshEvent::LoggedOut) => {
            (RefreshState::Idle, RefreshAction::None)
        }

        // --- Refreshing ---
        (
            RefreshState::Refreshing {
                epoch,
                mut queue,
                next,
            },
            RefreshEvent::AuthFailed {
                pending,
                epoch: failed_epoch,
                ..
            },
        ) if failed_epoch == epoch => {
            queue.push(pending);
            let position = queue.len() - 1;
            (
                RefreshState::Refreshing { epoch, queue, next },
                RefreshAction::Queued { position },
            )
        }

        // a later session whose credential was replaced since the send
        (
            state @ RefreshState::Refreshing { .. },
            RefreshEvent::AuthFailed {
                pending,
                credential_changed: true,
                ..
            },
        ) => (state, RefreshAction::ReplayNow(pending)),

        (
            RefreshState::Refreshing { epoch, queue, next },
            RefreshEvent::AuthFailed {
                pending,
                epoch: failed_epoch,
                ..
            },
        ) => {
            let mut deferred = match next {
                Some(d) if d.epoch == failed_epoch => d,
                // an older `next` belongs to a session that has ended too
                _ => Deferred {
                    epoch: failed_epoch,
                    queue: Vec::new(),
                },
            };
            deferred.queue.push(pending);
            let position = deferred.queue.len() - 1;
            (
                RefreshState::Refreshing {
                    epoch,
                    queue,
                    next: Some(deferred),
                },
                RefreshAction::Queued { position },
            )
        }

        (RefreshState::Refreshing { epoch, mut queue, next }, RefreshEvent::LoggedOut) => {
            if let Some(deferred) = next {
                queue.extend(deferred.queue);
            }
            (
                RefreshState::Refreshing {
                    epoch,
                    queue: Vec::new(),
                    next: None,
                },
                RefreshAction::Abandon(queue),
            )
        }

        (RefreshState::Refreshing { queue, next, .. }, RefreshEvent::Settled(outcome)) => {
            let settled = match outcome {
                RefreshOutcome::Succeeded => RefreshAction::Replay(queue),
                RefreshOutcome::Failed => RefreshAction::Expire(queue),
                RefreshOutcome::Superseded => RefreshAction::Abandon(queue),
            };
            match next {
                Some(Deferred { epoch, queue }) if !queue.is_empty() => (
                    RefreshState::Refreshing {
                        epoch,
                        queue,
                        next: None,
                    },
                    RefreshAction::Restart {
                        settled: Box::new(settled),
                        epoch,
                    },
                ),
                _ => (RefreshState::Idle, settled),
            }
        }
    }
}

/// Shared holder for the coordinator state.
///
/// A std Mutex is enough: transitions are pure and never held across an await.
#[derive(Debug, Default)]
pub(crate) struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Apply an auth failure.
    ///
    /// `current_generation` is read while the state lock is held, so a refresh
    /// that settles concurrently is either seen as settled (credential changed)
    /// or still in flight (request queued), never neither.
    pub(crate) fn auth_failed(
        &self,
        pending: PendingRequest,
        sent_generation: u64,
        current_generation: impl FnOnce() -> u64,
        epoch: u64,
    ) -> RefreshAction {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let credential_changed = current_generation() != sent_generation;
        let state = std::mem::take(&mut *guard);
        let (next, action) = handle_event(
            state,
            RefreshEvent::AuthFailed {
                pending,
                credential_changed,
                epoch,
            },
        );
        *guard = next;
        action
    }

    /// Apply any other event.
    pub(crate) fn apply(&self, event: RefreshEvent) -> RefreshAction {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let state = std::mem::take(&mut *guard);
        let (next, action) = handle_event(state, event);
        *guard = next;
        action
    }

    pub(crate) fn is_refreshing(&self) -> bool {
        let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        matches!(*guard, RefreshState::Refreshing { .. })
    }
}
