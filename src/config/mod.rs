//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - CLI arguments (for the `npjwi` binary)
//!
//! The endpoint may be a URL or the name of an entry in the `[environments]`
//! table:
//!
//! ```toml
//! endpoint = "staging"
//!
//! [environments]
//! staging = "https://agent-staging.example.com/npjwi"
//!
//! [profile]
//! app_id = "demo"
//! user_id = "alice"
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{NpjwiError, Result};
use crate::protocol::{
    ClientInfo, RequesterType, StartSession, DEFAULT_LONG_POLL_TIMEOUT_SECS, DEFAULT_MAX_RETRIES,
    DEFAULT_SESSION_TIMEOUT_MS, MAX_CONSECUTIVE_RECEIVE_ERRORS, POLL_GRACE_MS, RETRY_DELAY_MS,
    SEND_TIMEOUT_MS,
};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server URL or environment alias. Empty means not configured.
    #[serde(default)]
    pub endpoint: String,

    /// System info attached to every request as `sysInfo`
    #[serde(default)]
    pub sys_info: Option<String>,

    /// Channel timeouts and receive loop limits
    #[serde(default)]
    pub transport: TransportConfig,

    /// StartSession retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Session profile used to build StartSession
    #[serde(default)]
    pub profile: SessionProfile,

    /// Environment aliases (`name = "url"`)
    #[serde(default)]
    pub environments: BTreeMap<String, String>,
}

impl ClientConfig {
    /// Config with only the endpoint set
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| NpjwiError::Config(format!("Failed to read config file: {e}")))?;

        Ok(toml::from_str(&content)?)
    }

    /// Default config file location (`<config_dir>/npjwi/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("npjwi").join("config.toml"))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // `NPJWI_URL` wins over `NPJWI_ENV`
        if let Ok(env) = std::env::var("NPJWI_ENV") {
            config.endpoint = env;
        }
        if let Ok(url) = std::env::var("NPJWI_URL") {
            config.endpoint = url;
        }
        if let Ok(info) = std::env::var("NPJWI_SYS_INFO") {
            config.sys_info = Some(info);
        }
        if let Ok(val) = std::env::var("NPJWI_MAX_RETRIES") {
            if let Ok(val) = val.parse() {
                config.retry.max_retries = val;
            }
        }

        // Profile
        if let Ok(app_id) = std::env::var("NPJWI_APP_ID") {
            config.profile.app_id = app_id;
        }
        if let Ok(code) = std::env::var("NPJWI_ACCESS_CODE") {
            config.profile.access_code = code;
        }
        if let Ok(user_id) = std::env::var("NPJWI_USER_ID") {
            config.profile.user_id = user_id;
        }
        if let Ok(language) = std::env::var("NPJWI_LANGUAGE") {
            config.profile.language = language;
        }

        config
    }

    /// Merge with another config (other takes precedence)
    pub fn merge(self, other: Self) -> Self {
        fn pick<T: PartialEq>(base: T, other: T, default: T) -> T {
            if other != default {
                other
            } else {
                base
            }
        }

        let profile_default = SessionProfile::default();
        let mut environments = self.environments;
        environments.extend(other.environments);

        Self {
            endpoint: pick(self.endpoint, other.endpoint, String::new()),
            sys_info: other.sys_info.or(self.sys_info),
            transport: pick(self.transport, other.transport, TransportConfig::default()),
            retry: pick(self.retry, other.retry, RetryConfig::default()),
            profile: SessionProfile {
                app_id: pick(self.profile.app_id, other.profile.app_id, profile_default.app_id),
                access_code: pick(
                    self.profile.access_code,
                    other.profile.access_code,
                    profile_default.access_code,
                ),
                user_id: pick(self.profile.user_id, other.profile.user_id, profile_default.user_id),
                user_name: pick(
                    self.profile.user_name,
                    other.profile.user_name,
                    profile_default.user_name,
                ),
                language: pick(
                    self.profile.language,
                    other.profile.language,
                    profile_default.language,
                ),
                ..other.profile
            },
            environments,
        }
    }

    /// Whether an endpoint has been configured
    pub fn has_endpoint(&self) -> bool {
        !self.endpoint.trim().is_empty()
    }

    /// Resolve the endpoint (alias or URL) to a URL
    pub fn resolve_endpoint(&self) -> Result<Url> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(NpjwiError::NotInitialized);
        }

        let target = self
            .environments
            .get(endpoint)
            .map(String::as_str)
            .unwrap_or(endpoint);

        Url::parse(target).map_err(|e| NpjwiError::InvalidEndpoint(format!("{target}: {e}")))
    }
}

/// Channel timeouts and receive loop limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Send channel exchange timeout (ms)
    pub send_timeout_ms: u64,

    /// Long-poll timeout requested from the server (seconds)
    pub long_poll_timeout_secs: u64,

    /// Extra time a poll exchange may take (ms)
    pub poll_grace_ms: u64,

    /// Receive loop stops once consecutive errors exceed this
    pub max_consecutive_receive_errors: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: SEND_TIMEOUT_MS,
            long_poll_timeout_secs: DEFAULT_LONG_POLL_TIMEOUT_SECS,
            poll_grace_ms: POLL_GRACE_MS,
            max_consecutive_receive_errors: MAX_CONSECUTIVE_RECEIVE_ERRORS,
        }
    }
}

impl TransportConfig {
    /// Send channel timeout
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Receive channel timeout: long-poll timeout plus grace
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.long_poll_timeout_secs) + Duration::from_millis(self.poll_grace_ms)
    }
}

/// StartSession retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after a server error on StartSession
    pub max_retries: u32,

    /// Fixed delay between retries (ms)
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay_ms: RETRY_DELAY_MS,
        }
    }
}

impl RetryConfig {
    /// Delay between retries
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Who is talking to the agent, and with what client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionProfile {
    /// Application ID
    pub app_id: String,
    /// Opaque access code
    pub access_code: String,
    /// User ID
    pub user_id: String,
    /// Given name, seeded as `_User.Profile.GivenName`
    pub user_name: String,
    /// 2-letter language code
    pub language: String,
    /// Client identifier
    pub client_id: String,
    /// Client type
    pub client_type: String,
    /// Client design
    pub client_design: String,
    /// Client version string
    pub client_version: String,
    /// Advertised capabilities
    pub capabilities: Vec<String>,
    /// Server-side idle timeout requested at start (ms)
    pub session_timeout_ms: u64,
    /// Requester type
    pub requester_type: RequesterType,
}

impl Default for SessionProfile {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            access_code: String::new(),
            user_id: String::new(),
            user_name: String::new(),
            language: "en".to_string(),
            client_id: "NPJWIClient".to_string(),
            client_type: "WebBrowser".to_string(),
            client_design: "NoDesign".to_string(),
            client_version: format!("npjwi-rs {}", crate::VERSION),
            capabilities: vec!["TTS".to_string()],
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            requester_type: RequesterType::Client,
        }
    }
}

impl SessionProfile {
    /// Build the StartSession payload for this profile
    pub fn start_session(&self) -> StartSession {
        let tz_adjust = local_timezone_adjust();

        let mut initial_states = BTreeMap::new();
        initial_states.insert(
            "_User.Profile.GivenName".to_string(),
            Value::String(self.user_name.clone()),
        );
        initial_states.insert(
            "_User.Location.TimezoneAdjust".to_string(),
            Value::from(tz_adjust),
        );

        StartSession {
            app_id: self.app_id.clone(),
            access_code: Some(self.access_code.clone()).filter(|c| !c.is_empty()),
            user_id: self.user_id.clone(),
            user_language: Some(self.language.clone()).filter(|l| !l.is_empty()),
            client_info: ClientInfo {
                client_id: self.client_id.clone(),
                client_type: self.client_type.clone(),
                client_design: self.client_design.clone(),
                client_version: self.client_version.clone(),
                client_capabilities: self.capabilities.clone(),
                client_options: None,
            },
            initial_states,
            requester_type: Some(self.requester_type),
            session_timeout: Some(self.session_timeout_ms),
            timezone_utc_adjust: Some(tz_adjust),
        }
    }
}

/// Minutes to add to local time to reach UTC (positive west of Greenwich)
pub fn local_timezone_adjust() -> i32 {
    let offset_secs = chrono::Local::now().offset().local_minus_utc();
    -offset_secs / 60
}
