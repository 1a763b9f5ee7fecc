//! Error classification.
//!
//! Server and locally synthesized error codes are mapped to a small set of
//! categories. The category alone decides what the engine does with the
//! session:
//!
//! | Category         | Session action                         |
//! |------------------|----------------------------------------|
//! | `SessionExpired` | clear id, disconnect                   |
//! | `Credentials`    | clear id, disconnect                   |
//! | `Client`         | clear id, disconnect                   |
//! | `Server`         | retry StartSession, otherwise disconnect |
//! | `Network`        | none                                   |
//! | `Unknown`        | none                                   |

use std::fmt;

use serde::{Deserialize, Serialize};

/// Known error codes
pub mod codes {
    /// Session id unknown to the server
    pub const INVALID_SESSIONID: &str = "ERR_INVALID_SESSIONID";
    /// Session expired server-side
    pub const SESSION_TIMEOUT: &str = "ERR_SESSION_TIMEOUT";
    /// Access code rejected
    pub const BAD_ACCESSCODE: &str = "ERR_BAD_ACCESSCODE";
    /// Transport failure sending a request
    pub const SEND_REQUEST: &str = "ERR_SEND_REQUEST";
    /// Transport exchange exceeded its timeout
    pub const SEND_TIMEOUT: &str = "ERR_SEND_TIMEOUT";
    /// Host is offline
    pub const INTERNET_DISCONNECTED: &str = "ERR_INTERNET_DISCONNECTED";
    /// Missing request parameter
    pub const MISSING_PARAMETER: &str = "ERR_MISSING_PARAMETER";
    /// Unknown request parameter
    pub const UNKNOWN_PARAMETER: &str = "ERR_UNKNOWN_PARAMETER";
    /// Wrongly typed request parameter
    pub const BAD_PARAMETER_TYPE: &str = "ERR_BAD_PARAMETER_TYPE";
    /// Poll without a cursor
    pub const MISSING_AGENTMESSAGEID: &str = "ERR_MISSING_AGENTMESSAGEID";
    /// Poll with a cursor the server did not issue
    pub const UNEXPECTED_AGENTMESSAGEID: &str = "ERR_UNEXPECTED_AGENTMESSAGEID";
    /// Request type not handled
    pub const UNHANDLED_REQUEST: &str = "ERR_UNHANDLED_REQUEST";
    /// HTTP 502
    pub const PROXY_ERROR: &str = "ERR_PROXY_ERROR";
    /// HTTP 504
    pub const PROXY_TIMEOUT: &str = "ERR_PROXY_TIMEOUT";
    /// Any other non-2xx status
    pub const SYSTEM_ERROR: &str = "ERR_SYSTEM_ERROR";
    /// Server-side timeout
    pub const SERVER_TIMEOUT: &str = "ERR_SERVER_TIMEOUT";
    /// Access denied
    pub const ACCESS_ERROR: &str = "ERR_ACCESS_ERROR";
    /// Server exception
    pub const EXCEPTION: &str = "ERR_EXCEPTION";
    /// StartSession retries exhausted
    pub const SERVER_CONNECTION: &str = "ERR_SERVER_CONNECTION";
}

/// Error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Session expired or invalid
    SessionExpired,
    /// Connectivity problem
    Network,
    /// Server-side failure
    Server,
    /// Malformed request from this client
    Client,
    /// Bad access code
    Credentials,
    /// Anything unrecognized
    Unknown,
}

impl ErrorCategory {
    /// Whether errors of this category end the session
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::SessionExpired | Self::Credentials | Self::Client | Self::Server
        )
    }

    /// Whether errors of this category also drop the session id
    pub fn clears_session(self) -> bool {
        matches!(self, Self::SessionExpired | Self::Credentials | Self::Client)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SessionExpired => "session_expired",
            Self::Network => "network",
            Self::Server => "server",
            Self::Client => "client",
            Self::Credentials => "credentials",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Map an error code to its category
pub fn categorize(code: &str) -> ErrorCategory {
    use codes::*;
    match code {
        INVALID_SESSIONID | SESSION_TIMEOUT => ErrorCategory::SessionExpired,
        BAD_ACCESSCODE => ErrorCategory::Credentials,
        SEND_REQUEST | INTERNET_DISCONNECTED | SEND_TIMEOUT => ErrorCategory::Network,
        MISSING_PARAMETER
        | UNKNOWN_PARAMETER
        | BAD_PARAMETER_TYPE
        | MISSING_AGENTMESSAGEID
        | UNEXPECTED_AGENTMESSAGEID
        | UNHANDLED_REQUEST => ErrorCategory::Client,
        PROXY_ERROR | PROXY_TIMEOUT | SYSTEM_ERROR | SERVER_TIMEOUT | ACCESS_ERROR | EXCEPTION
        | SERVER_CONNECTION => ErrorCategory::Server,
        _ => ErrorCategory::Unknown,
    }
}

/// Display text for an error code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDescription {
    /// Short title
    pub title: String,
    /// One-sentence explanation
    pub message: String,
}

impl ErrorDescription {
    fn new(title: &str, message: &str) -> Self {
        Self {
            title: title.to_string(),
            message: message.to_string(),
        }
    }
}

const CLIENT_ERROR_MESSAGE: &str =
    "A client error has occurred. Please contact our support team for assistance.";

/// Title and message suitable for showing to a user.
///
/// Client errors share one message so that parameter names never leak into
/// the UI. Unknown codes fall back to a generic description naming the code.
pub fn describe(code: &str) -> ErrorDescription {
    use codes::*;
    match code {
        INVALID_SESSIONID => ErrorDescription::new(
            "Invalid Session",
            "Your session is no longer valid. Please start a new session.",
        ),
        SESSION_TIMEOUT => ErrorDescription::new(
            "Session Timeout",
            "Your session has expired due to inactivity.",
        ),
        BAD_ACCESSCODE => ErrorDescription::new(
            "Invalid Access Code",
            "The access code provided is invalid or has expired.",
        ),
        SERVER_CONNECTION => ErrorDescription::new(
            "Server Connection Error",
            "Unable to connect to the server. Please try again later.",
        ),
        ACCESS_ERROR => ErrorDescription::new(
            "Access Denied",
            "You do not have permission to access this resource.",
        ),
        SYSTEM_ERROR => ErrorDescription::new(
            "System Error",
            "An unexpected system error occurred. Please try again.",
        ),
        EXCEPTION => ErrorDescription::new(
            "Server Exception",
            "The server encountered an unexpected error while processing your request.",
        ),
        PROXY_ERROR => ErrorDescription::new(
            "Proxy Error",
            "Unable to connect to the server. The proxy returned an error (502).",
        ),
        PROXY_TIMEOUT => ErrorDescription::new(
            "Gateway Timeout",
            "The server is taking too long to respond.",
        ),
        SERVER_TIMEOUT => ErrorDescription::new(
            "Server Timeout",
            "The server did not answer in time. Please try again.",
        ),
        SEND_REQUEST => ErrorDescription::new(
            "Network Error",
            "Failed to send your request due to a network error.",
        ),
        SEND_TIMEOUT => ErrorDescription::new(
            "Request Timeout",
            "The request took too long to complete. Please check your connection.",
        ),
        INTERNET_DISCONNECTED => ErrorDescription::new(
            "No Internet Connection",
            "You appear to be offline. Please check your internet connection.",
        ),
        _ if categorize(code) == ErrorCategory::Client => {
            ErrorDescription::new("Client Error", CLIENT_ERROR_MESSAGE)
        }
        _ => ErrorDescription {
            title: "Unknown Error".to_string(),
            message: format!("An error occurred: {code}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_table() {
        assert_eq!(categorize("ERR_INVALID_SESSIONID"), ErrorCategory::SessionExpired);
        assert_eq!(categorize("ERR_SESSION_TIMEOUT"), ErrorCategory::SessionExpired);
        assert_eq!(categorize("ERR_BAD_ACCESSCODE"), ErrorCategory::Credentials);
        assert_eq!(categorize("ERR_SEND_REQUEST"), ErrorCategory::Network);
        assert_eq!(categorize("ERR_SEND_TIMEOUT"), ErrorCategory::Network);
        assert_eq!(categorize("ERR_UNHANDLED_REQUEST"), ErrorCategory::Client);
        assert_eq!(categorize("ERR_PROXY_ERROR"), ErrorCategory::Server);
        assert_eq!(categorize("ERR_SERVER_CONNECTION"), ErrorCategory::Server);
        assert_eq!(categorize("ERR_SOMETHING_NEW"), ErrorCategory::Unknown);
        assert_eq!(categorize(""), ErrorCategory::Unknown);
    }

    #[test]
    fn test_category_dispositions() {
        assert!(ErrorCategory::Server.is_fatal());
        assert!(!ErrorCategory::Server.clears_session());
        assert!(ErrorCategory::Client.clears_session());
        assert!(!ErrorCategory::Network.is_fatal());
        assert!(!ErrorCategory::Unknown.is_fatal());
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe("ERR_INVALID_SESSIONID").title, "Invalid Session");
        assert_eq!(describe("ERR_MISSING_PARAMETER").title, "Client Error");
        assert_eq!(describe("ERR_MISSING_PARAMETER").message, CLIENT_ERROR_MESSAGE);

        let unknown = describe("ERR_WHATEVER");
        assert_eq!(unknown.title, "Unknown Error");
        assert!(unknown.message.contains("ERR_WHATEVER"));
    }
}
