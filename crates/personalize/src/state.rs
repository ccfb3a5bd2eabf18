//! Personalization session state machine.
//!
//! # State Transitions
//!
//! ```text
//! Start
//!     ↓ (preconditions pass)
//! GateChecked ──→ ShortCircuitDone      (partition already locked)
//!     │     └───→ Locked                (complete residue, lock only)
//!     ↓ (secrets generated)
//! Generated
//!     ↓ (flash seeds written)
//! FlashWritten
//!     ↓ (OTP secrets written)
//! OtpWritten
//!     ↓ (lock issued and read back locked)
//! Locked
//!     ↓ (session checks complete)
//! Verified
//!     ↓ (bundle assembled)
//! Exported
//!     ↓
//! Done
//! ```
//!
//! Any non-terminal state may move to `Failed`. `ShortCircuitDone`, `Done`
//! and `Failed` are terminal; no state is entered twice. A session that
//! visited `Locked` or `ShortCircuitDone` left the partition reading locked.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, warn};

/// Maximum number of state transitions to track in history.
const MAX_HISTORY_SIZE: usize = 32;

/// Coarse failure class recorded in the `Failed` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Precondition,
    Generation,
    Write,
    Lock,
    Query,
    Verification,
    PartiallyProvisioned,
    Session,
}

/// Session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Start,
    GateChecked,
    ShortCircuitDone,
    Generated,
    FlashWritten,
    OtpWritten,
    Locked,
    Verified,
    Exported,
    Done,
    Failed(ErrorKind),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::ShortCircuitDone | SessionState::Done | SessionState::Failed(_)
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SessionState::ShortCircuitDone | SessionState::Done)
    }

    fn may_advance_to(&self, next: &SessionState) -> bool {
        use SessionState::*;

        if let Failed(_) = next {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Start, GateChecked)
                | (GateChecked, ShortCircuitDone)
                | (GateChecked, Generated)
                | (GateChecked, Locked)
                | (Generated, FlashWritten)
                | (FlashWritten, OtpWritten)
                | (OtpWritten, Locked)
                | (Locked, Verified)
                | (Verified, Exported)
                | (Exported, Done)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("invalid state transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },
}

/// Record of a state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: SessionState,
    pub to_state: SessionState,
    /// Unix epoch milliseconds
    pub timestamp: u64,
    pub reason: Option<String>,
}

/// One personalization session's progress through the state machine.
#[derive(Debug, Clone)]
pub struct PersonalizationSession {
    current_state: SessionState,
    history: VecDeque<StateTransition>,
}

impl Default for PersonalizationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PersonalizationSession {
    /// Create a new session in `Start` state.
    pub fn new() -> Self {
        Self {
            current_state: SessionState::Start,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn current_state(&self) -> SessionState {
        self.current_state
    }

    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Whether the session ever reached `state`.
    pub fn visited(&self, state: SessionState) -> bool {
        self.current_state == state || self.history.iter().any(|t| t.from_state == state)
    }

    /// Move to `next`, rejecting any edge not in the transition graph.
    pub fn advance(&mut self, next: SessionState, reason: &str) -> Result<(), StateError> {
        if !self.current_state.may_advance_to(&next) {
            warn!(from = ?self.current_state, to = ?next, "Rejected session transition");
            return Err(StateError::InvalidTransition {
                from: self.current_state,
                to: next,
            });
        }

        debug!(from = ?self.current_state, to = ?next, reason, "Session transition");

        if self.history.len() >= MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(StateTransition {
            from_state: self.current_state,
            to_state: next,
            timestamp: current_timestamp(),
            reason: Some(reason.to_string()),
        });
        self.current_state = next;
        Ok(())
    }

    /// Move to `Failed(kind)` unless already terminal.
    pub fn fail(&mut self, kind: ErrorKind, reason: &str) {
        if self.current_state.is_terminal() {
            return;
        }
        // Failed is reachable from every non-terminal state
        let _ = self.advance(SessionState::Failed(kind), reason);
    }
}

fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(session: &mut PersonalizationSession, states: &[SessionState]) {
        for state in states {
            session.advance(*state, "test").unwrap();
        }
    }

    #[test]
    fn test_full_path() {
        let mut session = PersonalizationSession::new();
        run(
            &mut session,
            &[
                SessionState::GateChecked,
                SessionState::Generated,
                SessionState::FlashWritten,
                SessionState::OtpWritten,
                SessionState::Locked,
                SessionState::Verified,
                SessionState::Exported,
                SessionState::Done,
            ],
        );

        assert!(session.current_state().is_success());
        assert_eq!(session.history().len(), 8);
        assert!(session.visited(SessionState::Locked));
    }

    #[test]
    fn test_short_circuit_path() {
        let mut session = PersonalizationSession::new();
        run(&mut session, &[SessionState::GateChecked, SessionState::ShortCircuitDone]);

        assert!(session.current_state().is_terminal());
        assert!(!session.visited(SessionState::Generated));
    }

    #[test]
    fn test_cannot_skip_writes() {
        let mut session = PersonalizationSession::new();
        run(&mut session, &[SessionState::GateChecked, SessionState::Generated]);

        let err = session.advance(SessionState::OtpWritten, "skip").unwrap_err();
        assert_eq!(
            err,
            StateError::InvalidTransition {
                from: SessionState::Generated,
                to: SessionState::OtpWritten
            }
        );
        assert_eq!(session.current_state(), SessionState::Generated);
    }

    #[test]
    fn test_no_state_reentered() {
        let mut session = PersonalizationSession::new();
        run(&mut session, &[SessionState::GateChecked]);
        assert!(session.advance(SessionState::GateChecked, "again").is_err());
        assert!(session.advance(SessionState::Start, "back").is_err());
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut session = PersonalizationSession::new();
        run(&mut session, &[SessionState::GateChecked, SessionState::Generated]);

        session.fail(ErrorKind::Write, "flash fault");
        assert_eq!(session.current_state(), SessionState::Failed(ErrorKind::Write));

        session.fail(ErrorKind::Lock, "ignored");
        assert_eq!(session.current_state(), SessionState::Failed(ErrorKind::Write));
        assert!(session.advance(SessionState::FlashWritten, "resume").is_err());
    }

    #[test]
    fn test_done_cannot_fail() {
        let mut session = PersonalizationSession::new();
        run(&mut session, &[SessionState::GateChecked, SessionState::ShortCircuitDone]);
        session.fail(ErrorKind::Query, "late");
        assert_eq!(session.current_state(), SessionState::ShortCircuitDone);
    }
}
