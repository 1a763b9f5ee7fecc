//! Outbound request queue.
//!
//! At most one request is in flight on the send channel. A request stays
//! "in flight" until the engine has finished handling its outcome, so that
//! requests submitted while handling the outcome line up behind the ones
//! already waiting.

use std::collections::VecDeque;

use crate::protocol::{Request, RequestType};

/// FIFO of requests waiting for the send channel
#[derive(Debug, Default)]
pub struct SendQueue {
    pending: VecDeque<Request>,
    in_flight: Option<RequestType>,
}

impl SendQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `request`. Returns it back when the channel is idle and it
    /// must be transmitted now.
    pub fn submit(&mut self, request: Request) -> Option<Request> {
        if self.in_flight.is_some() {
            tracing::debug!(
                request_type = %request.request_type(),
                queue_len = self.pending.len() + 1,
                "Send active, queued request"
            );
            self.pending.push_back(request);
            return None;
        }

        self.in_flight = Some(request.request_type());
        Some(request)
    }

    /// Type of the request currently in flight
    pub fn in_flight(&self) -> Option<RequestType> {
        self.in_flight
    }

    /// Mark the in-flight exchange finished. Returns the next request to
    /// transmit, if any.
    pub fn finish(&mut self) -> Option<Request> {
        self.in_flight = None;
        let next = self.pending.pop_front()?;
        tracing::trace!(
            request_type = %next.request_type(),
            queue_len = self.pending.len(),
            "Pop next send from queue"
        );
        self.in_flight = Some(next.request_type());
        Some(next)
    }

    /// Requests waiting behind the in-flight one
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether nothing is in flight
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{EndSession, MessageComplete};

    fn end(id: &str) -> Request {
        Request::EndSession(EndSession {
            session_id: id.into(),
        })
    }

    #[test]
    fn test_idle_queue_transmits_immediately() {
        let mut queue = SendQueue::new();
        assert!(queue.is_idle());
        assert_eq!(queue.submit(end("S1")), Some(end("S1")));
        assert_eq!(queue.in_flight(), Some(RequestType::EndSession));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_busy_queue_holds_requests_in_order() {
        let mut queue = SendQueue::new();
        queue.submit(end("S1"));
        assert!(queue.submit(end("S2")).is_none());
        let complete = Request::MessageComplete(MessageComplete {
            session_id: "S1".into(),
            agent_message_id: "A1".into(),
        });
        assert!(queue.submit(complete.clone()).is_none());
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.finish(), Some(end("S2")));
        assert_eq!(queue.finish(), Some(complete));
        assert_eq!(queue.in_flight(), Some(RequestType::MessageComplete));
        assert_eq!(queue.finish(), None);
        assert!(queue.is_idle());
    }
}
