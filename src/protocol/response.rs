//! Inbound frames.
//!
//! Frames are parsed in two steps: the raw JSON is read first so that a
//! missing or unexpected `responseType` can be reported precisely, then the
//! body is decoded into its typed variant. Each channel only accepts the
//! response types the server may legitimately return on it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// One of the two HTTP channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Outbound request/response channel
    Send,
    /// Inbound long-poll channel
    Receive,
}

impl Channel {
    /// Whether `typ` may arrive on this channel
    pub fn accepts(self, typ: ResponseType) -> bool {
        use ResponseType as R;
        match self {
            Self::Send => matches!(
                typ,
                R::SessionStarted
                    | R::SessionEnded
                    | R::ReceivedClientMessage
                    | R::ReceivedMessageComplete
                    | R::Error
                    | R::SessionStatus
                    | R::AppData
                    | R::UserData
                    | R::UserDataStored
                    | R::AssistantData
            ),
            Self::Receive => matches!(typ, R::AgentMessage | R::TimeoutNoMessage | R::Error),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send => f.write_str("send"),
            Self::Receive => f.write_str("receive"),
        }
    }
}

/// Response kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseType {
    /// Session opened
    SessionStarted,
    /// Session closed
    SessionEnded,
    /// Client message accepted
    ReceivedClientMessage,
    /// MessageComplete accepted
    ReceivedMessageComplete,
    /// Agent output
    AgentMessage,
    /// Long-poll elapsed with nothing to deliver
    TimeoutNoMessage,
    /// Server-reported error
    Error,
    /// Liveness answer
    SessionStatus,
    /// Application data
    AppData,
    /// User data
    UserData,
    /// User data stored
    UserDataStored,
    /// Assistant data
    AssistantData,
}

impl ResponseType {
    /// All known response types
    pub const ALL: [ResponseType; 12] = [
        Self::SessionStarted,
        Self::SessionEnded,
        Self::ReceivedClientMessage,
        Self::ReceivedMessageComplete,
        Self::AgentMessage,
        Self::TimeoutNoMessage,
        Self::Error,
        Self::SessionStatus,
        Self::AppData,
        Self::UserData,
        Self::UserDataStored,
        Self::AssistantData,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStarted => "SessionStarted",
            Self::SessionEnded => "SessionEnded",
            Self::ReceivedClientMessage => "ReceivedClientMessage",
            Self::ReceivedMessageComplete => "ReceivedMessageComplete",
            Self::AgentMessage => "AgentMessage",
            Self::TimeoutNoMessage => "TimeoutNoMessage",
            Self::Error => "Error",
            Self::SessionStatus => "SessionStatus",
            Self::AppData => "AppData",
            Self::UserData => "UserData",
            Self::UserDataStored => "UserDataStored",
            Self::AssistantData => "AssistantData",
        }
    }

    /// Parse a wire name
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors turning a response body into a [`Response`]
#[derive(Error, Debug)]
pub enum FrameError {
    /// Body is not JSON
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// No `responseType` field
    #[error("missing responseType")]
    MissingResponseType,

    /// Unknown type, or a type not expected on this channel
    #[error("unexpected responseType {response_type:?} on {channel} channel")]
    Unexpected {
        /// The type that was received
        response_type: String,
        /// Channel it arrived on
        channel: Channel,
    },

    /// Known type but the body does not match its shape
    #[error("malformed {response_type} frame: {source}")]
    Malformed {
        /// Declared type
        response_type: ResponseType,
        /// Decode failure
        #[source]
        source: serde_json::Error,
    },
}

/// Parse a 2xx response body received on `channel`.
pub fn parse_frame(body: &str, channel: Channel) -> Result<Response, FrameError> {
    let value: Value = serde_json::from_str(body).map_err(FrameError::InvalidJson)?;

    let name = value
        .get("responseType")
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingResponseType)?;

    let response_type = ResponseType::from_wire(name)
        .filter(|t| channel.accepts(*t))
        .ok_or_else(|| FrameError::Unexpected {
            response_type: name.to_string(),
            channel,
        })?;

    serde_json::from_value(value).map_err(|source| FrameError::Malformed {
        response_type,
        source,
    })
}

/// Protocol response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "responseType")]
pub enum Response {
    /// Session opened
    SessionStarted(SessionStarted),
    /// Session closed
    SessionEnded(SessionEnded),
    /// Client message accepted
    ReceivedClientMessage(ReceivedClientMessage),
    /// MessageComplete accepted
    ReceivedMessageComplete(ReceivedMessageComplete),
    /// Agent output
    AgentMessage(AgentMessage),
    /// Idle long-poll
    TimeoutNoMessage(TimeoutNoMessage),
    /// Server-reported error
    Error(ApiError),
    /// Liveness answer
    SessionStatus(SessionStatus),
    /// Application data
    AppData(AppData),
    /// User data
    UserData(UserData),
    /// User data stored
    UserDataStored(UserDataStored),
    /// Assistant data
    AssistantData(AssistantData),
}

impl Response {
    /// Kind of this response
    pub fn response_type(&self) -> ResponseType {
        match self {
            Self::SessionStarted(_) => ResponseType::SessionStarted,
            Self::SessionEnded(_) => ResponseType::SessionEnded,
            Self::ReceivedClientMessage(_) => ResponseType::ReceivedClientMessage,
            Self::ReceivedMessageComplete(_) => ResponseType::ReceivedMessageComplete,
            Self::AgentMessage(_) => ResponseType::AgentMessage,
            Self::TimeoutNoMessage(_) => ResponseType::TimeoutNoMessage,
            Self::Error(_) => ResponseType::Error,
            Self::SessionStatus(_) => ResponseType::SessionStatus,
            Self::AppData(_) => ResponseType::AppData,
            Self::UserData(_) => ResponseType::UserData,
            Self::UserDataStored(_) => ResponseType::UserDataStored,
            Self::AssistantData(_) => ResponseType::AssistantData,
        }
    }
}

/// Server-declared delivery strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueuingMode {
    /// Messages are delivered as soon as they exist
    #[default]
    Inactive,
    /// Server-driven notification
    #[serde(rename = "SDN")]
    ServerDrivenNotification,
}

/// SessionStarted response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStarted {
    /// Server-issued session id
    #[serde(rename = "sessionID", default)]
    pub session_id: String,
    /// Delivery strategy
    #[serde(rename = "remoteMessageQueuing", default)]
    pub remote_message_queuing: Option<QueuingMode>,
    /// Server clock
    #[serde(rename = "serverTime", default, skip_serializing_if = "Option::is_none")]
    pub server_time: Option<Value>,
    /// Server-side processing time
    #[serde(rename = "executionTime", default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<Value>,
}

/// SessionEnded response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEnded {
    /// Session that ended
    #[serde(rename = "sessionID", default)]
    pub session_id: String,
}

/// ReceivedClientMessage response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedClientMessage {
    /// Session
    #[serde(rename = "sessionID", default)]
    pub session_id: String,
    /// Acknowledged client message
    #[serde(rename = "clientMessageID", default)]
    pub client_message_id: String,
}

/// ReceivedMessageComplete response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedMessageComplete {
    /// Session
    #[serde(rename = "sessionID", default)]
    pub session_id: String,
    /// Acknowledged agent message
    #[serde(rename = "agentMessageID", default)]
    pub agent_message_id: String,
}

/// TimeoutNoMessage response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutNoMessage {
    /// Session
    #[serde(rename = "sessionID", default)]
    pub session_id: String,
}

/// Agent message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentMessageType {
    /// Full answer to a client message
    Complete,
    /// Incremental fragment, absorbed without dispatch
    Partial,
    /// Unsolicited message
    Asynch,
    /// Last message of the session
    Final,
}

/// Actions requested by the agent. Only `stateChanges` is interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DoAction {
    /// Context state updates
    #[serde(rename = "stateChanges", default, skip_serializing_if = "Option::is_none")]
    pub state_changes: Option<BTreeMap<String, Value>>,
    /// Everything else, passed through untouched
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// AgentMessage response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Session
    #[serde(rename = "sessionID", default)]
    pub session_id: String,
    /// Cursor value for this message
    #[serde(rename = "agentMessageID", default)]
    pub agent_message_id: String,
    /// Message kind
    #[serde(rename = "agentMessageType")]
    pub agent_message_type: AgentMessageType,
    /// Client message this answers, if any
    #[serde(rename = "clientMessageID", default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
    /// Agent actions
    #[serde(rename = "do", default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<DoAction>,
    /// Presentation content (`say`, `display`, ...), not interpreted
    #[serde(flatten)]
    pub content: Map<String, Value>,
}

impl AgentMessage {
    /// Whether this message closes the session
    pub fn is_final(&self) -> bool {
        self.agent_message_type == AgentMessageType::Final
    }

    /// State changes requested by the agent, if any
    pub fn state_changes(&self) -> Option<&BTreeMap<String, Value>> {
        self.actions.as_ref()?.state_changes.as_ref()
    }
}

/// Error response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Request that failed, as reported by the server
    #[serde(rename = "requestType", default, skip_serializing_if = "Option::is_none")]
    pub request_type: Option<String>,
    /// Session, if any
    #[serde(rename = "sessionID", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Error code (`ERR_*`)
    #[serde(rename = "errorCode", default)]
    pub error_code: String,
    /// Human-readable message
    #[serde(rename = "errorMessage", default)]
    pub error_message: String,
    /// Server clock
    #[serde(rename = "serverTime", default, skip_serializing_if = "Option::is_none")]
    pub server_time: Option<Value>,
    /// Server-side processing time
    #[serde(rename = "executionTime", default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<Value>,
}

impl ApiError {
    /// Error produced locally (HTTP status, transport failure) for a request
    pub fn local(code: &str, request_type: &str, message: impl Into<String>) -> Self {
        Self {
            request_type: Some(request_type.to_string()),
            error_code: code.to_string(),
            error_message: message.into(),
            ..Default::default()
        }
    }
}

/// Session liveness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionActivity {
    /// Session still exists on the server
    Active,
    /// Session expired or unknown
    Inactive,
}

/// SessionStatus response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Session checked
    #[serde(rename = "sessionID", default)]
    pub session_id: String,
    /// Liveness
    pub status: SessionActivity,
    /// Server clock
    #[serde(rename = "serverTime", default, skip_serializing_if = "Option::is_none")]
    pub server_time: Option<Value>,
    /// Server-side processing time
    #[serde(rename = "executionTime", default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<Value>,
}

/// AppData response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppData {
    /// Application ID
    #[serde(rename = "appID", default)]
    pub app_id: String,
    /// Data item
    #[serde(rename = "dataID", default)]
    pub data_id: String,
    /// Serialized data
    #[serde(rename = "appData", default)]
    pub app_data: String,
}

/// UserData response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    /// User ID
    #[serde(rename = "userID", default)]
    pub user_id: String,
    /// Data item
    #[serde(rename = "dataID", default)]
    pub data_id: String,
    /// Serialized data
    #[serde(rename = "userData", default)]
    pub user_data: String,
}

/// UserDataStored response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDataStored {
    /// User ID
    #[serde(rename = "userID", default)]
    pub user_id: String,
    /// Data item
    #[serde(rename = "dataID", default)]
    pub data_id: String,
}

/// AssistantData response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantData {
    /// Data item
    #[serde(rename = "dataID", default)]
    pub data_id: String,
    /// Serialized data
    #[serde(rename = "assistantData", default)]
    pub assistant_data: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_agent_message() {
        let body = json!({
            "responseType": "AgentMessage",
            "sessionID": "S1",
            "agentMessageID": "A1",
            "agentMessageType": "Complete",
            "say": [{"type": "Statement", "visual": "Hello"}],
            "do": {"stateChanges": {"Mode": "Chat"}, "SDN": {"clientState": "Enabled"}}
        })
        .to_string();

        let Response::AgentMessage(msg) = parse_frame(&body, Channel::Receive).unwrap() else {
            panic!("expected AgentMessage");
        };
        assert_eq!(msg.agent_message_id, "A1");
        assert_eq!(msg.agent_message_type, AgentMessageType::Complete);
        assert_eq!(msg.state_changes().unwrap()["Mode"], "Chat");
        assert!(msg.content.contains_key("say"));
        assert!(!msg.content.contains_key("responseType"));
        assert!(msg.actions.as_ref().unwrap().other.contains_key("SDN"));
    }

    #[test]
    fn test_parse_error_frame() {
        let body = r#"{"responseType":"Error","requestType":"PullAgentMessage",
            "errorCode":"ERR_INVALID_SESSIONID","errorMessage":"bad","serverTime":"t","executionTime":3}"#;
        let Response::Error(err) = parse_frame(body, Channel::Receive).unwrap() else {
            panic!("expected Error");
        };
        assert_eq!(err.error_code, "ERR_INVALID_SESSIONID");
        assert_eq!(err.request_type.as_deref(), Some("PullAgentMessage"));
        assert_eq!(err.execution_time, Some(json!(3)));
    }

    #[test]
    fn test_channel_filters_response_types() {
        let body = r#"{"responseType":"SessionStarted","sessionID":"S1"}"#;
        assert!(parse_frame(body, Channel::Send).is_ok());
        assert!(matches!(
            parse_frame(body, Channel::Receive),
            Err(FrameError::Unexpected { .. })
        ));
    }

    #[test]
    fn test_unknown_and_missing_response_type() {
        assert!(matches!(
            parse_frame(r#"{"responseType":"Bogus"}"#, Channel::Send),
            Err(FrameError::Unexpected { .. })
        ));
        assert!(matches!(
            parse_frame(r#"{"sessionID":"S1"}"#, Channel::Send),
            Err(FrameError::MissingResponseType)
        ));
        assert!(matches!(
            parse_frame("not json", Channel::Receive),
            Err(FrameError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_malformed_known_type() {
        let body = r#"{"responseType":"SessionStatus","sessionID":"S1","status":"Maybe"}"#;
        assert!(matches!(
            parse_frame(body, Channel::Send),
            Err(FrameError::Malformed {
                response_type: ResponseType::SessionStatus,
                ..
            })
        ));
    }

    #[test]
    fn test_queuing_mode_wire_names() {
        let body = r#"{"responseType":"SessionStarted","sessionID":"S1","remoteMessageQueuing":"SDN"}"#;
        let Response::SessionStarted(started) = parse_frame(body, Channel::Send).unwrap() else {
            panic!("expected SessionStarted");
        };
        assert_eq!(
            started.remote_message_queuing,
            Some(QueuingMode::ServerDrivenNotification)
        );
    }
}
