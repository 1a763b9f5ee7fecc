//! Long-poll receive loop bookkeeping.
//!
//! The loop itself is driven by the engine: every completed poll is fed back
//! through [`ReceiveLoop::complete`], and the engine asks for the next poll
//! with [`ReceiveLoop::poll`]. Polls are tagged with a generation so that
//! completions of aborted polls can be told apart from the live one.

use tracing::{error, info, warn};

use crate::protocol::{PullAgentMessage, Request};

/// Outcome of [`ReceiveLoop::restart`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restart {
    /// The loop was inactive and has been resumed
    Resumed,
    /// The loop was already running; only the error counter was cleared
    AlreadyActive,
    /// There is no connected session to poll for
    NoSession,
}

/// Receive channel state
#[derive(Debug)]
pub struct ReceiveLoop {
    active: bool,
    pending: Option<u64>,
    next_generation: u64,
    consecutive_errors: u32,
    max_consecutive_errors: u32,
    timeout_secs: u64,
}

impl ReceiveLoop {
    /// Create an inactive loop
    pub fn new(timeout_secs: u64, max_consecutive_errors: u32) -> Self {
        Self {
            active: false,
            pending: None,
            next_generation: 0,
            consecutive_errors: 0,
            max_consecutive_errors,
            timeout_secs,
        }
    }

    /// Whether the loop re-polls after each completion
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether a poll is in flight
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Current consecutive-error count
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Activate the loop with a fresh error counter
    pub fn start(&mut self) {
        self.consecutive_errors = 0;
        self.active = true;
    }

    /// Deactivate. An in-flight poll still completes but is not followed
    /// by another one.
    pub fn stop(&mut self) {
        self.active = false;
    }

    /// Deactivate and forget the in-flight poll. Returns whether one was
    /// in flight.
    pub fn abort(&mut self) -> bool {
        self.active = false;
        self.pending.take().is_some()
    }

    /// Clear the error counter and reactivate if stopped
    pub fn restart(&mut self) -> Restart {
        self.consecutive_errors = 0;
        if self.active {
            return Restart::AlreadyActive;
        }
        self.active = true;
        Restart::Resumed
    }

    /// Build the next poll. Rejected while another poll is pending.
    pub fn poll(&mut self, session_id: &str, cursor: &str) -> Option<(u64, Request)> {
        if let Some(generation) = self.pending {
            error!(generation, "Poll requested while a poll is pending");
            return None;
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        self.pending = Some(generation);

        let request = Request::PullAgentMessage(PullAgentMessage {
            session_id: session_id.to_string(),
            timeout: self.timeout_secs,
            agent_message_id: cursor.to_string(),
        });
        Some((generation, request))
    }

    /// Accept the completion of poll `generation`. Returns false for
    /// stale completions, which must be ignored.
    pub fn complete(&mut self, generation: u64) -> bool {
        if self.pending == Some(generation) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    /// A valid frame arrived
    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
    }

    /// A poll failed or returned an error frame. Stops the loop once the
    /// count exceeds the limit. Returns whether the loop is still active.
    pub fn record_error(&mut self) -> bool {
        self.consecutive_errors += 1;
        if self.active && self.consecutive_errors > self.max_consecutive_errors {
            self.active = false;
            info!(
                consecutive_errors = self.consecutive_errors,
                "Stopped receive due to comm errors"
            );
        } else {
            warn!(consecutive_errors = self.consecutive_errors, "Receive error");
        }
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_carries_cursor_and_timeout() {
        let mut receive = ReceiveLoop::new(45, 5);
        receive.start();
        let (generation, request) = receive.poll("S1", "A7").unwrap();
        assert_eq!(generation, 1);
        let Request::PullAgentMessage(pull) = request else {
            panic!("expected PullAgentMessage");
        };
        assert_eq!(pull.session_id, "S1");
        assert_eq!(pull.agent_message_id, "A7");
        assert_eq!(pull.timeout, 45);
    }

    #[test]
    fn test_reentrant_poll_rejected() {
        let mut receive = ReceiveLoop::new(45, 5);
        receive.start();
        assert!(receive.poll("S1", "").is_some());
        assert!(receive.poll("S1", "").is_none());
        assert!(receive.complete(1));
        assert!(receive.poll("S1", "").is_some());
    }

    #[test]
    fn test_stale_completion_ignored() {
        let mut receive = ReceiveLoop::new(45, 5);
        receive.start();
        receive.poll("S1", "");
        assert!(receive.abort());
        assert!(!receive.complete(1));
        assert!(!receive.is_active());
    }

    #[test]
    fn test_stops_after_sixth_consecutive_error() {
        let mut receive = ReceiveLoop::new(45, 5);
        receive.start();
        for _ in 0..5 {
            assert!(receive.record_error());
        }
        assert!(!receive.record_error());
        assert_eq!(receive.consecutive_errors(), 6);
    }

    #[test]
    fn test_success_resets_counter() {
        let mut receive = ReceiveLoop::new(45, 5);
        receive.start();
        for _ in 0..5 {
            receive.record_error();
        }
        receive.record_success();
        assert!(receive.record_error());
        assert_eq!(receive.consecutive_errors(), 1);
    }

    #[test]
    fn test_restart() {
        let mut receive = ReceiveLoop::new(45, 5);
        assert_eq!(receive.restart(), Restart::Resumed);
        receive.record_error();
        assert_eq!(receive.restart(), Restart::AlreadyActive);
        assert_eq!(receive.consecutive_errors(), 0);
    }
}
