//! Ordered delivery of agent messages.

use std::collections::VecDeque;

use crate::protocol::{AgentMessage, AgentMessageType};

/// What dispatching a message of a given type involves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPlan {
    /// Hand the message to the application
    pub deliver: bool,
    /// Clear the loading indicator before delivery
    pub loading_off_before: bool,
    /// End the session (and clear the loading indicator) after delivery
    pub ends_session: bool,
}

impl DispatchPlan {
    /// Plan for `kind`
    pub fn for_type(kind: AgentMessageType) -> Self {
        match kind {
            AgentMessageType::Partial => Self {
                deliver: false,
                loading_off_before: false,
                ends_session: false,
            },
            AgentMessageType::Complete => Self {
                deliver: true,
                loading_off_before: true,
                ends_session: false,
            },
            AgentMessageType::Asynch => Self {
                deliver: true,
                loading_off_before: false,
                ends_session: false,
            },
            AgentMessageType::Final => Self {
                deliver: true,
                loading_off_before: false,
                ends_session: true,
            },
        }
    }
}

/// Pending agent messages, drained one at a time in arrival order
#[derive(Debug, Default)]
pub struct Dispatcher {
    pending: VecDeque<AgentMessage>,
    processing: bool,
}

impl Dispatcher {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an arrived message
    pub fn push(&mut self, message: AgentMessage) {
        self.pending.push_back(message);
    }

    /// Claim the drain. Returns false if a drain is already running.
    pub fn begin(&mut self) -> bool {
        if self.processing {
            return false;
        }
        self.processing = true;
        true
    }

    /// Next message to dispatch
    pub fn next_message(&mut self) -> Option<AgentMessage> {
        self.pending.pop_front()
    }

    /// Release the drain
    pub fn finish(&mut self) {
        self.processing = false;
    }

    /// Messages not yet dispatched
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing awaits dispatch
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
