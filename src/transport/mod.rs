//! Transport seam between the protocol driver and the network.
//!
//! A transport performs one request/response exchange: POST a JSON body,
//! wait at most `timeout`, report what happened. It never interprets the
//! body. Both the send channel and the receive channel use the same
//! transport; the driver keeps them independent by running each exchange in
//! its own task.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Client (driver task)           │
//! │        owns Engine + Transport          │
//! └──────────────────┬──────────────────────┘
//!                    │ exchange(body, timeout)
//!          ┌────────┴────────┐
//!          ▼                 ▼
//! ┌─────────────────┐ ┌─────────────────┐
//! │  HttpTransport  │ │  test doubles   │
//! │   (reqwest)     │ │  (scripted)     │
//! └─────────────────┘ └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use npjwi::transport::{HttpTransport, Transport};
//!
//! # async fn demo() -> npjwi::Result<()> {
//! let transport = HttpTransport::new("http://localhost:8080/npjwi".parse().unwrap())?;
//! let outcome = transport
//!     .exchange(r#"{"requestType":"IsSessionActive"}"#.into(), Duration::from_secs(15))
//!     .await;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

mod http;

pub use http::HttpTransport;

use std::future::Future;
use std::pin::Pin;

use crate::classifier::codes;

/// Result of one exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// The server answered
    Completed {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },
    /// The request could not be sent or the response could not be read
    Failed(String),
    /// No answer within the timeout
    TimedOut,
}

impl ExchangeOutcome {
    /// Successful exchange with a 2xx status
    pub fn ok(body: impl Into<String>) -> Self {
        Self::Completed {
            status: 200,
            body: body.into(),
        }
    }

    /// Whether the server answered with a 2xx status
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { status, .. } if (200..300).contains(status))
    }
}

/// Error code reported for a completed exchange's HTTP status.
///
/// Returns `None` for 2xx and for status 0, which signals an exchange the
/// client abandoned itself.
pub fn status_error_code(status: u16) -> Option<&'static str> {
    match status {
        0 | 200..=299 => None,
        502 => Some(codes::PROXY_ERROR),
        504 => Some(codes::PROXY_TIMEOUT),
        _ => Some(codes::SYSTEM_ERROR),
    }
}

/// Pluggable request/response backend.
pub trait Transport: Send + Sync {
    /// POST `body` and wait for the answer, at most `timeout`.
    fn exchange(
        &self,
        body: String,
        timeout: std::time::Duration,
    ) -> Pin<Box<dyn Future<Output = ExchangeOutcome> + Send + '_>>;

    /// Transport name for logging
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_code() {
        assert_eq!(status_error_code(200), None);
        assert_eq!(status_error_code(204), None);
        assert_eq!(status_error_code(0), None);
        assert_eq!(status_error_code(502), Some("ERR_PROXY_ERROR"));
        assert_eq!(status_error_code(504), Some("ERR_PROXY_TIMEOUT"));
        assert_eq!(status_error_code(500), Some("ERR_SYSTEM_ERROR"));
        assert_eq!(status_error_code(404), Some("ERR_SYSTEM_ERROR"));
    }

    #[test]
    fn test_outcome_success() {
        assert!(ExchangeOutcome::ok("{}").is_success());
        assert!(!ExchangeOutcome::TimedOut.is_success());
        assert!(!ExchangeOutcome::Completed {
            status: 500,
            body: String::new()
        }
        .is_success());
    }
}
