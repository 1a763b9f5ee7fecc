//! Events emitted by the engine.
//!
//! Every observable side effect of the engine is a [`ClientEvent`]. The async
//! [`Client`](crate::client::Client) fans them out over a broadcast channel in
//! the order the engine produced them.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::classifier::{categorize, ErrorCategory};
use crate::protocol::{
    AgentMessage, ApiError, AppData, AssistantData, QueuingMode, UserData, UserDataStored,
};

/// An error after classification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedError {
    /// Disposition category
    pub category: ErrorCategory,
    /// Error code (`ERR_*`)
    pub error_code: String,
    /// Message from the server, or a local description
    pub error_message: String,
    /// Request that failed
    pub request_type: Option<String>,
    /// Server clock, when reported
    pub server_time: Option<Value>,
    /// Server processing time, when reported
    pub execution_time: Option<Value>,
    /// When the error was classified
    pub timestamp: DateTime<Utc>,
}

impl ClassifiedError {
    /// Classify an error payload
    pub fn from_api(err: &ApiError) -> Self {
        Self {
            category: categorize(&err.error_code),
            error_code: err.error_code.clone(),
            error_message: err.error_message.clone(),
            request_type: err.request_type.clone(),
            server_time: err.server_time.clone(),
            execution_time: err.execution_time.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Responses to the utility queries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum UtilityData {
    /// GetAppData answer
    App(AppData),
    /// GetUserData answer
    User(UserData),
    /// StoreUserData answer
    UserStored(UserDataStored),
    /// GetAssistantData answer
    Assistant(AssistantData),
}

/// Engine events
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ClientEvent {
    /// Session opened
    SessionStarted {
        /// Server-issued id
        session_id: String,
        /// Delivery strategy
        queuing: QueuingMode,
    },
    /// Server acknowledged EndSession
    SessionEnded {
        /// Session that ended
        session_id: String,
    },
    /// Liveness check found the session gone
    SessionExpired,
    /// A categorized error
    Error(ClassifiedError),
    /// Agent message dispatched to the application
    AgentMessage(AgentMessage),
    /// StartSession will be retried
    RetryScheduled {
        /// Retry number, starting at 1
        attempt: u32,
        /// Retry budget
        max_retries: u32,
        /// Delay before the retry is sent
        delay: Duration,
    },
    /// Whether an agent answer is pending
    AgentMessageLoading(bool),
    /// Whether a session start is in progress
    SessionConnecting(bool),
    /// Host went offline
    NetworkDown {
        /// When it was reported
        at: DateTime<Utc>,
    },
    /// Host came back online
    NetworkRestored {
        /// Whether the previous session survived
        session_valid: bool,
        /// When it was reported
        at: DateTime<Utc>,
    },
    /// Context states after merging an agent's state changes
    ContextStatesChanged(BTreeMap<String, Value>),
    /// Server accepted a client message
    ClientMessageReceived {
        /// Acknowledged id
        client_message_id: String,
    },
    /// Utility query answer
    UtilityData(UtilityData),
}

impl ClientEvent {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::SessionEnded { .. } => "session_ended",
            Self::SessionExpired => "session_expired",
            Self::Error(_) => "error",
            Self::AgentMessage(_) => "agent_message",
            Self::RetryScheduled { .. } => "retry_scheduled",
            Self::AgentMessageLoading(_) => "agent_message_loading",
            Self::SessionConnecting(_) => "session_connecting",
            Self::NetworkDown { .. } => "network_down",
            Self::NetworkRestored { .. } => "network_restored",
            Self::ContextStatesChanged(_) => "context_states_changed",
            Self::ClientMessageReceived { .. } => "client_message_received",
            Self::UtilityData(_) => "utility_data",
        }
    }

    /// The classified error, if this is an error event
    pub fn as_error(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}
