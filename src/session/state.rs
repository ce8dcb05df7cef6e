// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use tokio::sync::watch;
use tracing::{debug, warn};

/// Lifecycle states of a session.
///
/// A session is born `Lost`; the repair loop drives it to `Connected` (or
/// `ReadOnly`).  A dropped connection suspends it; an invalidated session id
/// loses it, taking every ephemeral and watch with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Lost,
    Connected,
    ReadOnly,
    Suspended,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Lost => "lost",
            SessionState::Connected => "connected",
            SessionState::ReadOnly => "read_only",
            SessionState::Suspended => "suspended",
        })
    }
}

const VALID_TRANSITIONS: [(SessionState, SessionState); 10] = [
    (SessionState::Lost, SessionState::Connected),
    (SessionState::Lost, SessionState::ReadOnly),
    (SessionState::Connected, SessionState::Suspended),
    (SessionState::Connected, SessionState::Lost),
    (SessionState::ReadOnly, SessionState::Connected),
    (SessionState::ReadOnly, SessionState::Suspended),
    (SessionState::ReadOnly, SessionState::Lost),
    (SessionState::Suspended, SessionState::Connected),
    (SessionState::Suspended, SessionState::ReadOnly),
    (SessionState::Suspended, SessionState::Lost),
];

/// The session state machine with parking support.
///
/// Waiters park on a set of states and wake on the first entry into any of
/// them; dropping the wait future deregisters the waiter.
pub struct SessionStateMachine {
    tx: watch::Sender<SessionState>,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SessionState::Lost);
        Self { tx }
    }

    pub fn current(&self) -> SessionState {
        *self.tx.borrow()
    }

    pub fn is_in(&self, states: &[SessionState]) -> bool {
        states.contains(&self.current())
    }

    /// Moves to `next`, waking every waiter parked on it.  A same-state
    /// transition is a no-op; an invalid one is logged and skipped so that
    /// racing background tasks cannot take the process down.
    pub fn transition_to(&self, next: SessionState) {
        let current = self.current();
        if current == next {
            debug!(%current, "state transition is a no-op");
            return;
        }
        if !VALID_TRANSITIONS.contains(&(current, next)) {
            warn!(%current, %next, "invalid session state transition ignored");
            return;
        }
        debug!("session transition: {current} -> {next}");
        self.tx.send_replace(next);
    }

    /// Parks until the session enters any of `states`; returns immediately
    /// when it is already in one.
    pub async fn wait_for(&self, states: &[SessionState]) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as the machine, so this cannot fail.
        let _ = rx.wait_for(|state| states.contains(state)).await;
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
