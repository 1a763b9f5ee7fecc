//! NPJWI wire protocol.
//!
//! Every exchange is a JSON object POSTed to a single endpoint. Requests carry
//! a `requestType` tag, responses a `responseType` tag. Two independent
//! channels share the endpoint:
//!
//! ```text
//! Client                                Server
//!    |                                    |
//!    |---- StartSession --------------->|   send channel
//!    |<--- SessionStarted (sessionID) ---|
//!    |                                    |
//!    |==== PullAgentMessage ===========>|   receive channel (long-poll)
//!    |                                    |
//!    |---- PushClientMessage ---------->|
//!    |<--- ReceivedClientMessage --------|
//!    |                                    |
//!    |<=== AgentMessage (Complete) =====|   cursor advances
//!    |==== PullAgentMessage ===========>|
//!    |<=== TimeoutNoMessage ============|   nothing within `timeout`
//!    |==== PullAgentMessage ===========>|
//!    |                                    |
//!    |---- EndSession ----------------->|
//!    |<--- SessionEnded -----------------|
//! ```
//!
//! ## Channels
//!
//! | Channel   | Requests                           | Responses accepted |
//! |-----------|------------------------------------|--------------------|
//! | send      | everything except PullAgentMessage | session, ack, utility, `Error` |
//! | receive   | PullAgentMessage                   | `AgentMessage`, `TimeoutNoMessage`, `Error` |
//!
//! # Usage
//!
//! ```rust
//! use npjwi::protocol::{parse_frame, Channel, Request, Response, EndSession};
//!
//! let request = Request::EndSession(EndSession { session_id: "S1".into() });
//! let body = request.to_body(None).unwrap();
//! assert!(body.contains("\"requestType\":\"EndSession\""));
//!
//! let frame = parse_frame(r#"{"responseType":"SessionEnded","sessionID":"S1"}"#, Channel::Send);
//! assert!(matches!(frame, Ok(Response::SessionEnded(_))));
//! ```

mod request;
mod response;

pub use request::{
    ClientInfo, EndSession, GetAppData, GetAssistantData, GetUserData, IsSessionActive,
    MessageComplete, PullAgentMessage, PushClientMessage, Request, RequestType, RequesterType,
    StartSession, StoreUserData, UserInput,
};
pub use response::{
    parse_frame, AgentMessage, AgentMessageType, ApiError, AppData, AssistantData, Channel,
    DoAction, FrameError, QueuingMode, ReceivedClientMessage, ReceivedMessageComplete, Response,
    ResponseType, SessionActivity, SessionEnded, SessionStarted, SessionStatus, TimeoutNoMessage,
    UserData, UserDataStored,
};

/// Long-poll timeout sent in `PullAgentMessage.timeout` (seconds)
pub const DEFAULT_LONG_POLL_TIMEOUT_SECS: u64 = 45;

/// Extra time a poll exchange may take beyond the long-poll timeout
pub const POLL_GRACE_MS: u64 = 5_000;

/// Send-channel exchange timeout
pub const SEND_TIMEOUT_MS: u64 = 15_000;

/// Receive loop stops once consecutive errors exceed this
pub const MAX_CONSECUTIVE_RECEIVE_ERRORS: u32 = 5;

/// StartSession retries after server errors
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Fixed delay between StartSession retries
pub const RETRY_DELAY_MS: u64 = 2_000;

/// Server-side session timeout requested at start (milliseconds)
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 60_000;
