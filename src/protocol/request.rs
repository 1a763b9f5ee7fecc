//! Outbound requests.
//!
//! Every request is a JSON object tagged by `requestType`. Requests are
//! immutable once built; the send queue owns them until their exchange
//! completes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Request kinds understood by an NPJWI server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    /// Open a session
    StartSession,
    /// Close a session
    EndSession,
    /// User input or state changes
    PushClientMessage,
    /// Long-poll for the next agent message
    PullAgentMessage,
    /// Acknowledge the last agent message
    MessageComplete,
    /// Session liveness query
    IsSessionActive,
    /// Application data query
    GetAppData,
    /// Per-user data query
    GetUserData,
    /// Per-user data store
    StoreUserData,
    /// Assistant data query
    GetAssistantData,
}

impl RequestType {
    /// Wire name of the request type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartSession => "StartSession",
            Self::EndSession => "EndSession",
            Self::PushClientMessage => "PushClientMessage",
            Self::PullAgentMessage => "PullAgentMessage",
            Self::MessageComplete => "MessageComplete",
            Self::IsSessionActive => "IsSessionActive",
            Self::GetAppData => "GetAppData",
            Self::GetUserData => "GetUserData",
            Self::StoreUserData => "StoreUserData",
            Self::GetAssistantData => "GetAssistantData",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol request envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "requestType")]
pub enum Request {
    /// Open a session
    StartSession(StartSession),
    /// Close a session
    EndSession(EndSession),
    /// Push user input / state changes
    PushClientMessage(PushClientMessage),
    /// Long-poll for agent messages
    PullAgentMessage(PullAgentMessage),
    /// Acknowledge an agent message
    MessageComplete(MessageComplete),
    /// Liveness query
    IsSessionActive(IsSessionActive),
    /// Application data query
    GetAppData(GetAppData),
    /// User data query
    GetUserData(GetUserData),
    /// User data store
    StoreUserData(StoreUserData),
    /// Assistant data query
    GetAssistantData(GetAssistantData),
}

impl Request {
    /// Kind of this request
    pub fn request_type(&self) -> RequestType {
        match self {
            Self::StartSession(_) => RequestType::StartSession,
            Self::EndSession(_) => RequestType::EndSession,
            Self::PushClientMessage(_) => RequestType::PushClientMessage,
            Self::PullAgentMessage(_) => RequestType::PullAgentMessage,
            Self::MessageComplete(_) => RequestType::MessageComplete,
            Self::IsSessionActive(_) => RequestType::IsSessionActive,
            Self::GetAppData(_) => RequestType::GetAppData,
            Self::GetUserData(_) => RequestType::GetUserData,
            Self::StoreUserData(_) => RequestType::StoreUserData,
            Self::GetAssistantData(_) => RequestType::GetAssistantData,
        }
    }

    /// Serialize to the JSON body posted to the server.
    ///
    /// When a system-info string is configured it is attached as `sysInfo`.
    /// Polls only carry the flag `"true"` instead of the full string.
    pub fn to_body(&self, sys_info: Option<&str>) -> Result<String> {
        let mut value = serde_json::to_value(self)?;

        if let (Some(info), Value::Object(map)) = (sys_info.filter(|s| !s.is_empty()), &mut value)
        {
            let attached = match self {
                Self::PullAgentMessage(_) => "true",
                _ => info,
            };
            map.insert("sysInfo".to_string(), Value::String(attached.to_string()));
        }

        Ok(serde_json::to_string(&value)?)
    }
}

/// Who is opening the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequesterType {
    /// End-user client
    #[default]
    Client,
    /// Server acting for a client
    ClientServer,
}

/// Client description sent with StartSession
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client identifier
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// Client type (e.g. `WebBrowser`)
    #[serde(rename = "clientType")]
    pub client_type: String,
    /// Client design name
    #[serde(rename = "clientDesign")]
    pub client_design: String,
    /// Client version string
    #[serde(rename = "clientVersion")]
    pub client_version: String,
    /// Advertised capabilities (e.g. `TTS`)
    #[serde(rename = "clientCapabilities", default)]
    pub client_capabilities: Vec<String>,
    /// Free-form client options
    #[serde(
        rename = "clientOptions",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub client_options: Option<BTreeMap<String, String>>,
}

/// StartSession payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartSession {
    /// Application ID
    #[serde(rename = "appID")]
    pub app_id: String,
    /// Opaque access code
    #[serde(rename = "accessCode", default, skip_serializing_if = "Option::is_none")]
    pub access_code: Option<String>,
    /// User ID
    #[serde(rename = "userID")]
    pub user_id: String,
    /// 2-letter ISO 639 language
    #[serde(rename = "userLanguage", default, skip_serializing_if = "Option::is_none")]
    pub user_language: Option<String>,
    /// Client description
    #[serde(rename = "clientInfo")]
    pub client_info: ClientInfo,
    /// Context states seeded at session start
    #[serde(rename = "initialStates", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub initial_states: BTreeMap<String, Value>,
    /// Requester type
    #[serde(rename = "requesterType", default, skip_serializing_if = "Option::is_none")]
    pub requester_type: Option<RequesterType>,
    /// Server-side session idle timeout (ms)
    #[serde(rename = "sessionTimeout", default, skip_serializing_if = "Option::is_none")]
    pub session_timeout: Option<u64>,
    /// Minutes to add to local time to get UTC
    #[serde(rename = "timezoneUtcAdjust", default, skip_serializing_if = "Option::is_none")]
    pub timezone_utc_adjust: Option<i32>,
}

/// EndSession payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndSession {
    /// Session to close
    #[serde(rename = "sessionID")]
    pub session_id: String,
}

/// User input carried by PushClientMessage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UserInput {
    /// Free text
    Text {
        /// Text typed by the user
        text: String,
    },
    /// Selected hint
    HintSelect {
        /// Value returned by the hint
        #[serde(rename = "returnValue")]
        return_value: String,
        /// Label shown for the hint
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    /// Selected info item
    InfoItemSelect {
        /// Item uid
        uid: String,
        /// Whether details should be returned
        #[serde(rename = "requireDetailsData")]
        require_details_data: bool,
    },
    /// GUI button press
    #[serde(rename = "GUI")]
    Gui {
        /// Button identifier (e.g. `StartOver`)
        #[serde(rename = "buttonID")]
        button_id: String,
        /// Optional parameter, empty when absent
        #[serde(default)]
        param: String,
    },
}

impl UserInput {
    /// Text input, trimmed
    pub fn text(text: &str) -> Self {
        Self::Text {
            text: text.trim().to_string(),
        }
    }

    /// GUI button press with an optional parameter
    pub fn gui(button_id: impl Into<String>, param: Option<&str>) -> Self {
        Self::Gui {
            button_id: button_id.into(),
            param: param.unwrap_or_default().to_string(),
        }
    }

    /// Hint selection
    pub fn hint(return_value: impl Into<String>) -> Self {
        Self::HintSelect {
            return_value: return_value.into(),
            text: None,
        }
    }

    /// Info item selection
    pub fn item(uid: impl Into<String>, require_details_data: bool) -> Self {
        Self::InfoItemSelect {
            uid: uid.into(),
            require_details_data,
        }
    }
}

/// PushClientMessage payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushClientMessage {
    /// Session the input belongs to
    #[serde(rename = "sessionID", default)]
    pub session_id: String,
    /// Client-side sequence id (`client_<n>`)
    #[serde(rename = "clientMessageID", default)]
    pub client_message_id: String,
    /// User input, if any
    #[serde(rename = "userInput", default, skip_serializing_if = "Option::is_none")]
    pub user_input: Option<UserInput>,
    /// Client state changes, if any
    #[serde(rename = "stateChanges", default, skip_serializing_if = "Option::is_none")]
    pub state_changes: Option<BTreeMap<String, Value>>,
}

/// PullAgentMessage payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullAgentMessage {
    /// Session being polled
    #[serde(rename = "sessionID")]
    pub session_id: String,
    /// Long-poll timeout (seconds)
    pub timeout: u64,
    /// Receive cursor, empty before the first message
    #[serde(rename = "agentMessageID")]
    pub agent_message_id: String,
}

/// MessageComplete payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageComplete {
    /// Session
    #[serde(rename = "sessionID")]
    pub session_id: String,
    /// Acknowledged message
    #[serde(rename = "agentMessageID")]
    pub agent_message_id: String,
}

/// IsSessionActive payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsSessionActive {
    /// Application ID
    #[serde(rename = "appID")]
    pub app_id: String,
    /// Session being checked
    #[serde(rename = "sessionID")]
    pub session_id: String,
}

/// GetAppData payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAppData {
    /// Application ID
    #[serde(rename = "appID")]
    pub app_id: String,
    /// Data item
    #[serde(rename = "dataID")]
    pub data_id: String,
    /// Narrow the query to one user (rankings)
    #[serde(rename = "userID", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// GetUserData payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetUserData {
    /// Access code
    #[serde(rename = "accessCode")]
    pub access_code: String,
    /// Application ID
    #[serde(rename = "appID")]
    pub app_id: String,
    /// User ID
    #[serde(rename = "userID")]
    pub user_id: String,
    /// Data item
    #[serde(rename = "dataID")]
    pub data_id: String,
}

/// StoreUserData payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreUserData {
    /// Access code
    #[serde(rename = "accessCode")]
    pub access_code: String,
    /// Application ID
    #[serde(rename = "appID")]
    pub app_id: String,
    /// User ID
    #[serde(rename = "userID")]
    pub user_id: String,
    /// Data item
    #[serde(rename = "dataID")]
    pub data_id: String,
    /// Serialized user data
    #[serde(rename = "userData")]
    pub user_data: String,
}

/// GetAssistantData payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAssistantData {
    /// Application ID
    #[serde(rename = "appID")]
    pub app_id: String,
    /// Access code
    #[serde(rename = "accessCode")]
    pub access_code: String,
    /// Data item
    #[serde(rename = "dataID")]
    pub data_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_tagged_by_request_type() {
        let req = Request::EndSession(EndSession {
            session_id: "S1".to_string(),
        });
        let value: Value = serde_json::from_str(&req.to_body(None).unwrap()).unwrap();
        assert_eq!(value["requestType"], "EndSession");
        assert_eq!(value["sessionID"], "S1");
        assert!(value.get("sysInfo").is_none());
    }

    #[test]
    fn test_sys_info_attached() {
        let req = Request::MessageComplete(MessageComplete {
            session_id: "S1".to_string(),
            agent_message_id: "A7".to_string(),
        });
        let value: Value = serde_json::from_str(&req.to_body(Some("linux/x64")).unwrap()).unwrap();
        assert_eq!(value["sysInfo"], "linux/x64");
        assert_eq!(value["agentMessageID"], "A7");
    }

    #[test]
    fn test_poll_carries_sys_info_flag_only() {
        let req = Request::PullAgentMessage(PullAgentMessage {
            session_id: "S1".to_string(),
            timeout: 45,
            agent_message_id: String::new(),
        });
        let value: Value = serde_json::from_str(&req.to_body(Some("linux/x64")).unwrap()).unwrap();
        assert_eq!(value["requestType"], "PullAgentMessage");
        assert_eq!(value["sysInfo"], "true");
        assert_eq!(value["agentMessageID"], "");
        assert_eq!(value["timeout"], 45);
    }

    #[test]
    fn test_gui_input_wire_shape() {
        let input = UserInput::gui("StartOver", None);
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(value["type"], "GUI");
        assert_eq!(value["buttonID"], "StartOver");
        assert_eq!(value["param"], "");
    }

    #[test]
    fn test_text_input_trimmed() {
        assert_eq!(
            UserInput::text("  hello there \n"),
            UserInput::Text {
                text: "hello there".to_string()
            }
        );
    }

    #[test]
    fn test_push_omits_empty_sections() {
        let req = Request::PushClientMessage(PushClientMessage {
            session_id: "S1".to_string(),
            client_message_id: "client_0".to_string(),
            user_input: Some(UserInput::hint("yes")),
            state_changes: None,
        });
        let value: Value = serde_json::from_str(&req.to_body(None).unwrap()).unwrap();
        assert_eq!(value["userInput"]["type"], "HintSelect");
        assert_eq!(value["userInput"]["returnValue"], "yes");
        assert!(value.get("stateChanges").is_none());
    }
}
