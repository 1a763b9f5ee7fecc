//! Sans-IO protocol engine.
//!
//! [`Engine`] owns every piece of protocol state: the session, the send
//! queue, the receive loop, the dispatcher and the retry counter. It never
//! performs I/O. Each operation mutates state and records [`Effect`]s, which
//! the caller drains with [`Engine::take_effects`] and executes:
//!
//! ```text
//!  application ──start/send/end──┐
//!  send exchange ──completion────┤        ┌──▶ Effect::Send / Effect::Poll
//!  poll exchange ──completion────┼─▶ Engine ──▶ Effect::AbortPoll
//!  retry timer ──fired───────────┤        ├──▶ Effect::ScheduleRetry
//!  connectivity ──online/offline─┘        └──▶ Effect::Emit(ClientEvent)
//! ```
//!
//! The async [`Client`](crate::client::Client) is one such caller; tests
//! drive the engine directly.
//!
//! # Example
//!
//! ```rust
//! use npjwi::config::ClientConfig;
//! use npjwi::engine::{Effect, Engine};
//! use npjwi::transport::ExchangeOutcome;
//!
//! let mut engine = Engine::new(ClientConfig::with_endpoint("http://localhost:9000/"));
//! engine.start().unwrap();
//! assert!(engine
//!     .take_effects()
//!     .iter()
//!     .any(|e| matches!(e, Effect::Send(_))));
//!
//! engine.on_send_complete(ExchangeOutcome::ok(
//!     r#"{"responseType":"SessionStarted","sessionID":"S1"}"#,
//! ));
//! assert!(engine.is_connected());
//! ```

mod dispatcher;
mod receive;
mod retry;
mod send_queue;
mod session;

pub use dispatcher::{DispatchPlan, Dispatcher};
pub use receive::{ReceiveLoop, Restart};
pub use retry::{RetryState, ScheduledRetry};
pub use send_queue::SendQueue;
pub use session::{ActiveSession, SessionState};

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use crate::classifier::{codes, ErrorCategory};
use crate::config::ClientConfig;
use crate::error::{NpjwiError, Result};
use crate::events::{ClassifiedError, ClientEvent, UtilityData};
use crate::protocol::{
    parse_frame, AgentMessage, ApiError, Channel, EndSession, GetAppData, GetAssistantData,
    GetUserData, IsSessionActive, MessageComplete, PushClientMessage, Request, RequestType,
    Response, SessionActivity, SessionEnded, SessionStarted, SessionStatus, StartSession,
    StoreUserData, UserInput,
};
use crate::transport::{status_error_code, ExchangeOutcome};

/// Work the engine asks its driver to perform
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Transmit on the send channel. Report the outcome with
    /// [`Engine::on_send_complete`].
    Send(Request),
    /// Transmit on the receive channel. Report the outcome with
    /// [`Engine::on_poll_complete`] and the same generation.
    Poll {
        /// Poll generation
        generation: u64,
        /// PullAgentMessage request
        request: Request,
    },
    /// Abandon the in-flight poll without reporting it
    AbortPoll,
    /// Call [`Engine::on_retry_timer`] with `token` after `delay`
    ScheduleRetry {
        /// Timer token
        token: u64,
        /// Delay
        delay: Duration,
    },
    /// Deliver an event to the application
    Emit(ClientEvent),
}

/// Point-in-time view of the engine
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Session state
    pub state: SessionState,
    /// Receive cursor
    pub cursor: String,
    /// Requests waiting behind the in-flight one
    pub queue_len: usize,
    /// Whether a send exchange is in flight
    pub send_in_flight: bool,
    /// Whether the receive loop is active
    pub receive_active: bool,
    /// Whether a poll is in flight
    pub poll_pending: bool,
    /// Consecutive receive errors
    pub consecutive_receive_errors: u32,
    /// StartSession retries since the last successful start
    pub retry_attempts: u32,
    /// Merged context states
    pub context_states: BTreeMap<String, Value>,
}

/// NPJWI protocol engine
#[derive(Debug)]
pub struct Engine {
    config: ClientConfig,
    state: SessionState,
    cursor: String,
    send_queue: SendQueue,
    receive: ReceiveLoop,
    dispatcher: Dispatcher,
    retry: RetryState,
    start_payload: Option<StartSession>,
    pending_end: Option<String>,
    context_states: BTreeMap<String, Value>,
    next_client_message: u64,
    effects: Vec<Effect>,
}

impl Engine {
    /// Create an engine in the `Uninitialized` state
    pub fn new(config: ClientConfig) -> Self {
        let receive = ReceiveLoop::new(
            config.transport.long_poll_timeout_secs,
            config.transport.max_consecutive_receive_errors,
        );
        let retry = RetryState::new(config.retry.max_retries, config.retry.delay());

        Self {
            config,
            state: SessionState::Uninitialized,
            cursor: String::new(),
            send_queue: SendQueue::new(),
            receive,
            dispatcher: Dispatcher::new(),
            retry,
            start_payload: None,
            pending_end: None,
            context_states: BTreeMap::new(),
            next_client_message: 0,
            effects: Vec::new(),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Session state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Session id known to the engine
    pub fn session_id(&self) -> Option<&str> {
        self.state.session_id()
    }

    /// Whether a session is connected
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Id of the last received agent message
    pub fn cursor(&self) -> &str {
        &self.cursor
    }

    /// Context states merged from agent state changes
    pub fn context_states(&self) -> &BTreeMap<String, Value> {
        &self.context_states
    }

    /// Drain the effects recorded so far, in order
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Point-in-time view
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state.clone(),
            cursor: self.cursor.clone(),
            queue_len: self.send_queue.len(),
            send_in_flight: !self.send_queue.is_idle(),
            receive_active: self.receive.is_active(),
            poll_pending: self.receive.is_pending(),
            consecutive_receive_errors: self.receive.consecutive_errors(),
            retry_attempts: self.retry.attempts(),
            context_states: self.context_states.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Start a session for the configured profile
    pub fn start(&mut self) -> Result<()> {
        let payload = self.config.profile.start_session();
        self.start_with(payload)
    }

    /// Start a session with an explicit payload. An existing session is
    /// ended first. The payload is kept for StartSession retries.
    pub fn start_with(&mut self, payload: StartSession) -> Result<()> {
        if !self.config.has_endpoint() {
            return Err(NpjwiError::NotInitialized);
        }

        if self.state.is_connected() {
            warn!("Session already active, ending existing session first");
            self.end();
        }

        self.retry.reset();
        self.begin_start(payload);
        Ok(())
    }

    fn begin_start(&mut self, payload: StartSession) {
        info!(app_id = %payload.app_id, user_id = %payload.user_id, "Starting session");
        self.state = SessionState::Connecting;
        self.emit(ClientEvent::SessionConnecting(true));
        self.start_payload = Some(payload.clone());
        self.submit(Request::StartSession(payload));
    }

    /// End the connected session. The state becomes `Disconnected`
    /// immediately; `SessionEnded` is emitted once the server acknowledges.
    pub fn end(&mut self) {
        let Some(session_id) = self.state.active().map(|s| s.id.clone()) else {
            warn!(state = %self.state, "No active session to end");
            return;
        };

        info!(%session_id, "Ending session");
        if self.receive.abort() {
            self.effects.push(Effect::AbortPoll);
        }
        self.retry.cancel();
        self.state = SessionState::Disconnected(None);
        self.pending_end = Some(session_id.clone());
        self.submit(Request::EndSession(EndSession { session_id }));
    }

    /// Change the user name and/or language. Restarts a connected session
    /// when anything changed. Returns whether anything changed.
    pub fn update_profile(&mut self, user_name: Option<&str>, language: Option<&str>) -> Result<bool> {
        let profile = &mut self.config.profile;
        let mut changed = false;

        if let Some(name) = user_name.filter(|n| *n != profile.user_name) {
            profile.user_name = name.to_string();
            changed = true;
        }
        if let Some(lang) = language.filter(|l| *l != profile.language) {
            profile.language = lang.to_string();
            changed = true;
        }

        if !changed {
            debug!("No profile changes, skipping session restart");
            return Ok(false);
        }

        if self.state.is_connected() {
            info!("Profile changed, restarting session");
            self.start()?;
        }
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Outbound messages
    // ------------------------------------------------------------------

    /// Send user input. Returns the client message id.
    pub fn send(&mut self, input: UserInput) -> Result<String> {
        self.push(PushClientMessage {
            user_input: Some(input),
            ..Default::default()
        })
    }

    /// Send trimmed text
    pub fn send_text(&mut self, text: &str) -> Result<String> {
        self.send(UserInput::text(text))
    }

    /// Press a GUI button
    pub fn send_gui(&mut self, button_id: &str, param: Option<&str>) -> Result<String> {
        self.send(UserInput::gui(button_id, param))
    }

    /// Select a hint
    pub fn select_hint(&mut self, return_value: &str) -> Result<String> {
        self.send(UserInput::hint(return_value))
    }

    /// Select an info item
    pub fn select_item(&mut self, uid: &str, require_details_data: bool) -> Result<String> {
        self.send(UserInput::item(uid, require_details_data))
    }

    /// Push client state changes
    pub fn send_state_changes(&mut self, states: BTreeMap<String, Value>) -> Result<String> {
        self.push(PushClientMessage {
            state_changes: Some(states),
            ..Default::default()
        })
    }

    /// Report a GPS fix
    pub fn send_gps(&mut self, gps: &str) -> Result<String> {
        let mut states = BTreeMap::new();
        states.insert("Client.GPS".to_string(), Value::from(gps));
        states.insert("Client.GPS.State".to_string(), Value::from("Active"));
        self.send_state_changes(states)
    }

    /// Push a raw client message. Missing session and client message ids
    /// are filled in.
    pub fn push(&mut self, mut message: PushClientMessage) -> Result<String> {
        let session_id = self.connected_id()?;

        if message.session_id.is_empty() {
            message.session_id = session_id;
        }
        if message.client_message_id.is_empty() {
            message.client_message_id = self.next_client_message_id();
        }

        let client_message_id = message.client_message_id.clone();
        debug!(%client_message_id, "Push client message");
        self.submit(Request::PushClientMessage(message));
        self.emit(ClientEvent::AgentMessageLoading(true));
        Ok(client_message_id)
    }

    /// Acknowledge the last received agent message
    pub fn message_complete(&mut self) -> Result<()> {
        let session_id = self.connected_id()?;
        self.submit(Request::MessageComplete(MessageComplete {
            session_id,
            agent_message_id: self.cursor.clone(),
        }));
        Ok(())
    }

    /// Queue a GetAppData query for the configured app
    pub fn get_app_data(&mut self, data_id: &str) {
        let profile = &self.config.profile;
        let request = Request::GetAppData(GetAppData {
            app_id: profile.app_id.clone(),
            data_id: data_id.to_string(),
            user_id: Some(profile.user_id.clone()).filter(|u| !u.is_empty()),
        });
        self.submit(request);
    }

    /// Queue a GetUserData query for the configured user
    pub fn get_user_data(&mut self, data_id: &str) {
        let profile = &self.config.profile;
        let request = Request::GetUserData(GetUserData {
            access_code: profile.access_code.clone(),
            app_id: profile.app_id.clone(),
            user_id: profile.user_id.clone(),
            data_id: data_id.to_string(),
        });
        self.submit(request);
    }

    /// Queue a StoreUserData request for the configured user
    pub fn store_user_data(&mut self, data_id: &str, user_data: &str) {
        let profile = &self.config.profile;
        let request = Request::StoreUserData(StoreUserData {
            access_code: profile.access_code.clone(),
            app_id: profile.app_id.clone(),
            user_id: profile.user_id.clone(),
            data_id: data_id.to_string(),
            user_data: user_data.to_string(),
        });
        self.submit(request);
    }

    /// Queue a GetAssistantData query for the configured app
    pub fn get_assistant_data(&mut self, data_id: &str) {
        let profile = &self.config.profile;
        let request = Request::GetAssistantData(GetAssistantData {
            app_id: profile.app_id.clone(),
            access_code: profile.access_code.clone(),
            data_id: data_id.to_string(),
        });
        self.submit(request);
    }

    // ------------------------------------------------------------------
    // Liveness and connectivity
    // ------------------------------------------------------------------

    /// Queue an IsSessionActive check. Returns false when there is no
    /// session to check.
    pub fn check_liveness(&mut self) -> bool {
        let Some(session_id) = self.state.session_id().map(str::to_string) else {
            debug!("No session to check");
            return false;
        };

        debug!(%session_id, "Checking session liveness");
        self.submit(Request::IsSessionActive(IsSessionActive {
            app_id: self.config.profile.app_id.clone(),
            session_id,
        }));
        true
    }

    /// The host lost connectivity
    pub fn network_offline(&mut self) {
        warn!("Network offline");
        self.emit(ClientEvent::NetworkDown { at: Utc::now() });
    }

    /// The host regained connectivity
    pub fn network_online(&mut self) {
        info!("Network online");
        if !self.check_liveness() {
            self.emit(ClientEvent::NetworkRestored {
                session_valid: false,
                at: Utc::now(),
            });
        }
    }

    /// Restart a stopped receive loop
    pub fn restart_receive(&mut self) -> Restart {
        if !self.state.is_connected() {
            return Restart::NoSession;
        }

        let outcome = self.receive.restart();
        if outcome == Restart::Resumed && !self.receive.is_pending() {
            info!("Receive restarted");
            self.issue_poll();
        }
        outcome
    }

    // ------------------------------------------------------------------
    // Send channel
    // ------------------------------------------------------------------

    /// Report the outcome of the in-flight send exchange
    pub fn on_send_complete(&mut self, outcome: ExchangeOutcome) {
        let Some(request_type) = self.send_queue.in_flight() else {
            warn!("Send completion with nothing in flight");
            return;
        };

        match outcome {
            ExchangeOutcome::Completed { status, body } if (200..300).contains(&status) => {
                trace!(%request_type, %body, "Send response");
                match parse_frame(&body, Channel::Send) {
                    Ok(response) => {
                        debug!(
                            %request_type,
                            response_type = %response.response_type(),
                            "Send response"
                        );
                        self.on_send_response(request_type, response);
                    }
                    Err(e) => error!(%request_type, error = %e, "Send response dropped"),
                }
            }
            ExchangeOutcome::Completed { status, .. } => {
                error!(%request_type, status, "Send response - HTTP status");
                if let Some(code) = status_error_code(status) {
                    self.handle_error(ApiError::local(
                        code,
                        request_type.as_str(),
                        format!("HTTP status {status}"),
                    ));
                }
            }
            ExchangeOutcome::Failed(reason) => {
                error!(%request_type, %reason, "Send request failed");
                self.handle_error(ApiError::local(
                    codes::SEND_REQUEST,
                    request_type.as_str(),
                    reason,
                ));
            }
            ExchangeOutcome::TimedOut => {
                error!(%request_type, "Send request timed out");
                self.handle_error(ApiError::local(
                    codes::SEND_TIMEOUT,
                    request_type.as_str(),
                    "Request timed out",
                ));
            }
        }

        if let Some(next) = self.send_queue.finish() {
            debug!(request_type = %next.request_type(), "Sending");
            self.effects.push(Effect::Send(next));
        }
    }

    fn on_send_response(&mut self, request_type: RequestType, response: Response) {
        match response {
            Response::SessionStarted(started) => self.on_session_started(started),
            Response::SessionEnded(ended) => self.on_session_ended(&ended),
            Response::ReceivedClientMessage(ack) => {
                self.emit(ClientEvent::ClientMessageReceived {
                    client_message_id: ack.client_message_id,
                });
            }
            Response::ReceivedMessageComplete(ack) => {
                debug!(agent_message_id = %ack.agent_message_id, "MessageComplete acknowledged");
            }
            Response::Error(mut err) => {
                if err.request_type.is_none() {
                    err.request_type = Some(request_type.as_str().to_string());
                }
                self.handle_error(err);
            }
            Response::SessionStatus(status) => self.on_session_status(&status),
            Response::AppData(data) => self.emit(ClientEvent::UtilityData(UtilityData::App(data))),
            Response::UserData(data) => {
                self.emit(ClientEvent::UtilityData(UtilityData::User(data)));
            }
            Response::UserDataStored(data) => {
                self.emit(ClientEvent::UtilityData(UtilityData::UserStored(data)));
            }
            Response::AssistantData(data) => {
                self.emit(ClientEvent::UtilityData(UtilityData::Assistant(data)));
            }
            Response::AgentMessage(_) | Response::TimeoutNoMessage(_) => {
                warn!(%request_type, "Receive-only response on send channel");
            }
        }
    }

    fn on_session_started(&mut self, started: SessionStarted) {
        if !matches!(self.state, SessionState::Connecting) {
            warn!(state = %self.state, "SessionStarted while not connecting");
        }

        let session = ActiveSession {
            id: started.session_id,
            queuing: started.remote_message_queuing.unwrap_or_default(),
        };
        info!(session_id = %session.id, queuing = ?session.queuing, "Session started");

        self.retry.reset();
        self.cursor.clear();
        self.state = SessionState::Connected(session.clone());
        self.emit(ClientEvent::AgentMessageLoading(true));

        if !self.receive.is_active() {
            self.receive.start();
            self.issue_poll();
        }

        self.emit(ClientEvent::SessionConnecting(false));
        self.emit(ClientEvent::SessionStarted {
            session_id: session.id,
            queuing: session.queuing,
        });
    }

    fn on_session_ended(&mut self, ended: &SessionEnded) {
        let requested = self.pending_end.take();

        let server_closed_live = self
            .state
            .active()
            .is_some_and(|s| s.id == ended.session_id);
        if server_closed_live {
            self.receive.stop();
        }
        if server_closed_live || matches!(self.state, SessionState::Disconnected(Some(_))) {
            self.state = SessionState::Disconnected(None);
        }
        self.cursor.clear();

        if requested.is_none() && !server_closed_live {
            debug!(session_id = %ended.session_id, "Unsolicited SessionEnded ignored");
            return;
        }

        let session_id = if ended.session_id.is_empty() {
            requested.unwrap_or_default()
        } else {
            ended.session_id.clone()
        };
        info!(%session_id, "Session ended");
        self.emit(ClientEvent::SessionEnded { session_id });
    }

    fn on_session_status(&mut self, status: &SessionStatus) {
        let valid = status.status == SessionActivity::Active;
        info!(session_id = %status.session_id, status = ?status.status, "Session status checked");
        self.emit(ClientEvent::NetworkRestored {
            session_valid: valid,
            at: Utc::now(),
        });

        if self.state.session_id().is_none() {
            debug!(state = %self.state, "No session to apply status to");
            return;
        }

        if valid {
            if let SessionState::Disconnected(Some(session)) = &self.state {
                info!(session_id = %session.id, "Session still active, reconnecting");
                self.state = SessionState::Connected(session.clone());
            }
            if !self.receive.is_active() {
                self.restart_receive();
            }
            return;
        }

        warn!("Session expired during reconnection");
        self.receive.stop();
        self.state = SessionState::Expired;
        self.emit(ClientEvent::SessionExpired);
        self.emit(ClientEvent::Error(ClassifiedError {
            category: ErrorCategory::SessionExpired,
            error_code: codes::SESSION_TIMEOUT.to_string(),
            error_message: "Session expired during reconnection".to_string(),
            request_type: Some(RequestType::IsSessionActive.as_str().to_string()),
            server_time: status.server_time.clone(),
            execution_time: status.execution_time.clone(),
            timestamp: Utc::now(),
        }));
    }

    // ------------------------------------------------------------------
    // Receive channel
    // ------------------------------------------------------------------

    /// Report the outcome of poll `generation`
    pub fn on_poll_complete(&mut self, generation: u64, outcome: ExchangeOutcome) {
        if !self.receive.complete(generation) {
            debug!(generation, "Ignoring stale poll completion");
            return;
        }

        match outcome {
            ExchangeOutcome::Completed { status, body } if (200..300).contains(&status) => {
                self.on_receive_body(&body);
            }
            ExchangeOutcome::Completed { status, .. } => {
                error!(status, "Receive response - HTTP status");
                self.receive.record_error();
            }
            ExchangeOutcome::Failed(reason) => {
                error!(%reason, "Receive request failed");
                self.receive.record_error();
            }
            ExchangeOutcome::TimedOut => {
                error!("Receive request timed out");
                self.receive.record_error();
            }
        }

        self.continue_receive();
    }

    fn on_receive_body(&mut self, body: &str) {
        trace!(%body, "Receive response");
        let response = match parse_frame(body, Channel::Receive) {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Receive response dropped");
                self.receive.record_error();
                return;
            }
        };

        match response {
            Response::TimeoutNoMessage(_) => self.receive.record_success(),
            Response::AgentMessage(message) => {
                self.receive.record_success();
                self.cursor.clone_from(&message.agent_message_id);
                if message.is_final() {
                    info!("Session ends due to agentMessageType=Final");
                    self.receive.stop();
                }
                self.dispatcher.push(message);
                self.drain_dispatcher();
            }
            Response::Error(mut err) => {
                self.receive.record_error();
                if err.request_type.is_none() {
                    err.request_type = Some(RequestType::PullAgentMessage.as_str().to_string());
                }
                self.handle_error(err);
            }
            other => {
                error!(response_type = %other.response_type(), "Unhandled receive response");
                self.receive.record_error();
            }
        }
    }

    fn continue_receive(&mut self) {
        if !self.receive.is_active() {
            return;
        }
        if !self.state.is_connected() {
            info!("Stopped receive due to end of session");
            self.receive.stop();
            return;
        }
        self.issue_poll();
    }

    fn issue_poll(&mut self) {
        let Some(session_id) = self.state.active().map(|s| s.id.clone()) else {
            return;
        };
        if let Some((generation, request)) = self.receive.poll(&session_id, &self.cursor) {
            trace!(generation, cursor = %self.cursor, "Poll");
            self.effects.push(Effect::Poll {
                generation,
                request,
            });
        }
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn drain_dispatcher(&mut self) {
        if !self.dispatcher.begin() {
            return;
        }
        while let Some(message) = self.dispatcher.next_message() {
            self.dispatch(message);
        }
        self.dispatcher.finish();
    }

    fn dispatch(&mut self, message: AgentMessage) {
        let plan = DispatchPlan::for_type(message.agent_message_type);
        if !plan.deliver {
            trace!(agent_message_id = %message.agent_message_id, "Partial message absorbed");
            return;
        }

        if plan.loading_off_before {
            self.emit(ClientEvent::AgentMessageLoading(false));
        }

        if let Some(changes) = message.state_changes() {
            self.context_states
                .extend(changes.iter().map(|(k, v)| (k.clone(), v.clone())));
            self.emit(ClientEvent::ContextStatesChanged(self.context_states.clone()));
        }

        debug!(
            agent_message_id = %message.agent_message_id,
            kind = ?message.agent_message_type,
            "Dispatching agent message"
        );
        self.emit(ClientEvent::AgentMessage(message));

        if plan.ends_session {
            self.end();
            self.emit(ClientEvent::AgentMessageLoading(false));
        }
    }

    // ------------------------------------------------------------------
    // Errors and retries
    // ------------------------------------------------------------------

    fn handle_error(&mut self, err: ApiError) {
        let classified = ClassifiedError::from_api(&err);
        error!(
            error_code = %classified.error_code,
            request_type = ?classified.request_type,
            category = %classified.category,
            message = %classified.error_message,
            "Error"
        );

        self.emit(ClientEvent::AgentMessageLoading(false));
        self.emit(ClientEvent::SessionConnecting(false));

        let category = classified.category;
        let request_type = classified.request_type.as_deref();
        let starting = request_type == Some(RequestType::StartSession.as_str());
        // On the receive channel only a dead session changes state; other
        // errors count toward the consecutive-error limit.
        let on_receive = request_type == Some(RequestType::PullAgentMessage.as_str());

        if category == ErrorCategory::Server && starting {
            self.retry_start(classified);
            return;
        }

        if category.is_fatal() && (!on_receive || category == ErrorCategory::SessionExpired) {
            self.disconnect(category.clears_session());
        }

        self.emit(ClientEvent::Error(classified));
    }

    fn retry_start(&mut self, cause: ClassifiedError) {
        if let Some(scheduled) = self.retry.schedule() {
            info!(
                attempt = scheduled.attempt,
                max_retries = self.retry.max_retries(),
                error_code = %cause.error_code,
                "Server error during StartSession, retrying"
            );
            self.state = SessionState::Connecting;
            self.effects.push(Effect::ScheduleRetry {
                token: scheduled.token,
                delay: scheduled.delay,
            });
            self.emit(ClientEvent::RetryScheduled {
                attempt: scheduled.attempt,
                max_retries: self.retry.max_retries(),
                delay: scheduled.delay,
            });
            return;
        }

        error!(
            attempts = self.retry.attempts(),
            "There's a problem with connection to server"
        );
        self.disconnect(false);
        self.emit(ClientEvent::Error(ClassifiedError {
            category: ErrorCategory::Server,
            error_code: codes::SERVER_CONNECTION.to_string(),
            error_message: "There's a problem with connection to server.".to_string(),
            request_type: cause.request_type,
            server_time: cause.server_time,
            execution_time: cause.execution_time,
            timestamp: Utc::now(),
        }));
    }

    /// Fire retry timer `token`
    pub fn on_retry_timer(&mut self, token: u64) {
        if !self.retry.fire(token) {
            debug!(token, "Ignoring cancelled retry timer");
            return;
        }
        let Some(payload) = self.start_payload.clone() else {
            warn!("Retry fired without a recorded StartSession");
            return;
        };
        info!(
            attempt = self.retry.attempts(),
            max_retries = self.retry.max_retries(),
            "Retrying session"
        );
        self.begin_start(payload);
    }

    fn disconnect(&mut self, clear_session: bool) {
        // A poll for a dropped session must not outlive it
        if clear_session && self.receive.abort() {
            self.effects.push(Effect::AbortPoll);
        }
        self.state = match std::mem::take(&mut self.state) {
            SessionState::Connected(session) | SessionState::Disconnected(Some(session))
                if !clear_session =>
            {
                SessionState::Disconnected(Some(session))
            }
            _ => SessionState::Disconnected(None),
        };
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn connected_id(&self) -> Result<String> {
        self.state
            .active()
            .map(|s| s.id.clone())
            .ok_or(NpjwiError::NotConnected)
    }

    fn next_client_message_id(&mut self) -> String {
        let id = format!("client_{}", self.next_client_message);
        self.next_client_message += 1;
        id
    }

    fn submit(&mut self, request: Request) {
        if let Some(request) = self.send_queue.submit(request) {
            debug!(request_type = %request.request_type(), "Sending");
            self.effects.push(Effect::Send(request));
        }
    }

    fn emit(&mut self, event: ClientEvent) {
        trace!(event = event.name(), "Emit");
        self.effects.push(Effect::Emit(event));
    }
}
