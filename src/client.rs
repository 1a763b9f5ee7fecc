//! Async driver for the protocol engine.
//!
//! [`Client`] spawns one tokio task that owns the [`Engine`]. Application
//! calls, exchange completions and retry timers all reach that task through
//! a single channel, so the engine sees one input at a time. Exchanges run
//! in their own tasks and post their outcome back when done.
//!
//! ```text
//!   Client handle ──Call──┐
//!   send task ──outcome───┤                      ┌──▶ send task (reqwest)
//!   poll task ──outcome───┼──▶ driver(Engine) ───┼──▶ poll task (abortable)
//!   retry timer ──token───┘                      ├──▶ retry timer
//!                                                └──▶ broadcast<ClientEvent>
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use npjwi::{client::Client, config::ClientConfig, events::ClientEvent};
//!
//! # async fn demo() -> npjwi::Result<()> {
//! let client = Client::connect(ClientConfig::from_env())?;
//! let mut events = client.subscribe();
//! client.start().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     if let ClientEvent::SessionStarted { .. } = event {
//!         client.send_text("Hello").await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::config::ClientConfig;
use crate::engine::{Effect, Engine, Restart, Snapshot};
use crate::error::{NpjwiError, Result};
use crate::events::ClientEvent;
use crate::protocol::{
    parse_frame, Channel, PushClientMessage, Request, Response, StartSession, UserInput,
};
use crate::transport::{ExchangeOutcome, HttpTransport, Transport};

/// Events buffered per subscriber before it starts lagging
pub const EVENT_CAPACITY: usize = 256;

type EngineCall = Box<dyn FnOnce(&mut Engine) + Send>;

enum Input {
    Call(EngineCall),
    SendComplete(ExchangeOutcome),
    PollComplete {
        generation: u64,
        outcome: ExchangeOutcome,
    },
    RetryTimer(u64),
    Shutdown,
}

/// Handle to a running engine
pub struct Client {
    inputs: mpsc::UnboundedSender<Input>,
    events: broadcast::Sender<ClientEvent>,
    transport: Arc<dyn Transport>,
    sys_info: Option<String>,
    send_timeout: Duration,
    task: JoinHandle<()>,
}

impl Client {
    /// Resolve the configured endpoint and drive the engine over HTTP
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let endpoint = config.resolve_endpoint()?;
        let transport = HttpTransport::new(endpoint)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Drive the engine over an arbitrary transport. Must be called from
    /// within a tokio runtime.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let (inputs, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let sys_info = config.sys_info.clone().filter(|s| !s.is_empty());
        let send_timeout = config.transport.send_timeout();

        let driver = Driver {
            poll_timeout: config.transport.poll_timeout(),
            send_timeout,
            sys_info: sys_info.clone(),
            engine: Engine::new(config),
            transport: Arc::clone(&transport),
            inputs: inputs.downgrade(),
            events: events.clone(),
            poll_task: None,
            retry_task: None,
        };
        let task = tokio::spawn(driver.run(rx));

        Self {
            inputs,
            events,
            transport,
            sys_info,
            send_timeout,
            task,
        }
    }

    /// Subscribe to engine events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Run `f` on the engine task and return its result
    pub async fn with_engine<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Engine) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let call: EngineCall = Box::new(move |engine| {
            let _ = tx.send(f(engine));
        });
        self.inputs
            .send(Input::Call(call))
            .map_err(|_| NpjwiError::EngineStopped)?;
        rx.await.map_err(|_| NpjwiError::EngineStopped)
    }

    /// Start a session for the configured profile
    pub async fn start(&self) -> Result<()> {
        self.with_engine(Engine::start).await?
    }

    /// Start a session with an explicit payload
    pub async fn start_with(&self, payload: StartSession) -> Result<()> {
        self.with_engine(move |engine| engine.start_with(payload))
            .await?
    }

    /// End the connected session
    pub async fn end(&self) -> Result<()> {
        self.with_engine(Engine::end).await
    }

    /// Send user input
    pub async fn send(&self, input: UserInput) -> Result<String> {
        self.with_engine(move |engine| engine.send(input)).await?
    }

    /// Send text
    pub async fn send_text(&self, text: impl Into<String>) -> Result<String> {
        let text = text.into();
        self.with_engine(move |engine| engine.send_text(&text))
            .await?
    }

    /// Press a GUI button
    pub async fn send_gui(&self, button_id: impl Into<String>, param: Option<String>) -> Result<String> {
        let button_id = button_id.into();
        self.with_engine(move |engine| engine.send_gui(&button_id, param.as_deref()))
            .await?
    }

    /// Select a hint
    pub async fn select_hint(&self, return_value: impl Into<String>) -> Result<String> {
        self.send(UserInput::hint(return_value)).await
    }

    /// Select an info item
    pub async fn select_item(&self, uid: impl Into<String>, require_details_data: bool) -> Result<String> {
        self.send(UserInput::item(uid, require_details_data)).await
    }

    /// Push client state changes
    pub async fn send_state_changes(&self, states: BTreeMap<String, Value>) -> Result<String> {
        self.with_engine(move |engine| engine.send_state_changes(states))
            .await?
    }

    /// Report a GPS fix
    pub async fn send_gps(&self, gps: impl Into<String>) -> Result<String> {
        let gps = gps.into();
        self.with_engine(move |engine| engine.send_gps(&gps)).await?
    }

    /// Push a raw client message
    pub async fn push(&self, message: PushClientMessage) -> Result<String> {
        self.with_engine(move |engine| engine.push(message)).await?
    }

    /// Acknowledge the last received agent message
    pub async fn message_complete(&self) -> Result<()> {
        self.with_engine(Engine::message_complete).await?
    }

    /// Queue a liveness check
    pub async fn check_liveness(&self) -> Result<bool> {
        self.with_engine(Engine::check_liveness).await
    }

    /// Report that the host went offline
    pub async fn network_offline(&self) -> Result<()> {
        self.with_engine(Engine::network_offline).await
    }

    /// Report that the host came back online
    pub async fn network_online(&self) -> Result<()> {
        self.with_engine(Engine::network_online).await
    }

    /// Restart a stopped receive loop
    pub async fn restart_receive(&self) -> Result<Restart> {
        self.with_engine(Engine::restart_receive).await
    }

    /// Change user name and/or language
    pub async fn update_profile(&self, user_name: Option<String>, language: Option<String>) -> Result<bool> {
        self.with_engine(move |engine| {
            engine.update_profile(user_name.as_deref(), language.as_deref())
        })
        .await?
    }

    /// Queue a GetAppData query
    pub async fn get_app_data(&self, data_id: impl Into<String>) -> Result<()> {
        let data_id = data_id.into();
        self.with_engine(move |engine| engine.get_app_data(&data_id))
            .await
    }

    /// Queue a GetUserData query
    pub async fn get_user_data(&self, data_id: impl Into<String>) -> Result<()> {
        let data_id = data_id.into();
        self.with_engine(move |engine| engine.get_user_data(&data_id))
            .await
    }

    /// Queue a StoreUserData request
    pub async fn store_user_data(&self, data_id: impl Into<String>, user_data: impl Into<String>) -> Result<()> {
        let (data_id, user_data) = (data_id.into(), user_data.into());
        self.with_engine(move |engine| engine.store_user_data(&data_id, &user_data))
            .await
    }

    /// Queue a GetAssistantData query
    pub async fn get_assistant_data(&self, data_id: impl Into<String>) -> Result<()> {
        let data_id = data_id.into();
        self.with_engine(move |engine| engine.get_assistant_data(&data_id))
            .await
    }

    /// Point-in-time view of the engine
    pub async fn snapshot(&self) -> Result<Snapshot> {
        self.with_engine(|engine| engine.snapshot()).await
    }

    /// One request/response exchange outside the send queue.
    ///
    /// Shares no state with the queue; meant for isolated utility queries.
    pub async fn call_direct(&self, request: Request) -> Result<Response> {
        let request_type = request.request_type();
        let body = request.to_body(self.sys_info.as_deref())?;
        debug!(%request_type, "Sending direct");

        match self.transport.exchange(body, self.send_timeout).await {
            ExchangeOutcome::Completed { status, body } if (200..300).contains(&status) => {
                Ok(parse_frame(&body, Channel::Send)?)
            }
            ExchangeOutcome::Completed { status, .. } => Err(NpjwiError::HttpStatus(status)),
            ExchangeOutcome::Failed(reason) => Err(NpjwiError::Network(reason)),
            ExchangeOutcome::TimedOut => Err(NpjwiError::Timeout),
        }
    }

    /// Stop the engine task and abandon in-flight exchanges
    pub async fn shutdown(self) {
        let _ = self.inputs.send(Input::Shutdown);
        if let Err(e) = self.task.await {
            error!(error = %e, "Engine task failed");
        }
    }
}

struct Driver {
    engine: Engine,
    transport: Arc<dyn Transport>,
    inputs: mpsc::WeakUnboundedSender<Input>,
    events: broadcast::Sender<ClientEvent>,
    poll_task: Option<JoinHandle<()>>,
    retry_task: Option<JoinHandle<()>>,
    sys_info: Option<String>,
    send_timeout: Duration,
    poll_timeout: Duration,
}

impl Driver {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Input>) {
        debug!(transport = self.transport.name(), "Engine task started");

        while let Some(input) = rx.recv().await {
            match input {
                Input::Call(call) => call(&mut self.engine),
                Input::SendComplete(outcome) => self.engine.on_send_complete(outcome),
                Input::PollComplete {
                    generation,
                    outcome,
                } => self.engine.on_poll_complete(generation, outcome),
                Input::RetryTimer(token) => self.engine.on_retry_timer(token),
                Input::Shutdown => break,
            }
            self.apply_effects();
        }

        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        if let Some(task) = self.retry_task.take() {
            task.abort();
        }
        debug!("Engine task stopped");
    }

    fn apply_effects(&mut self) {
        for effect in self.engine.take_effects() {
            match effect {
                Effect::Send(request) => self.spawn_send(&request),
                Effect::Poll {
                    generation,
                    request,
                } => self.spawn_poll(generation, &request),
                Effect::AbortPoll => {
                    if let Some(task) = self.poll_task.take() {
                        task.abort();
                    }
                }
                Effect::ScheduleRetry { token, delay } => self.spawn_retry(token, delay),
                Effect::Emit(event) => {
                    // No subscribers is not an error
                    let _ = self.events.send(event);
                }
            }
        }
    }

    fn spawn_send(&self, request: &Request) {
        let Some(body) = self.encode(request, Input::SendComplete) else {
            return;
        };
        let Some(inputs) = self.inputs.upgrade() else {
            return;
        };

        let transport = Arc::clone(&self.transport);
        let timeout = self.send_timeout;
        tokio::spawn(async move {
            let outcome = transport.exchange(body, timeout).await;
            let _ = inputs.send(Input::SendComplete(outcome));
        });
    }

    fn spawn_poll(&mut self, generation: u64, request: &Request) {
        let outcome_for = move |outcome| Input::PollComplete {
            generation,
            outcome,
        };
        let Some(body) = self.encode(request, outcome_for) else {
            return;
        };
        let Some(inputs) = self.inputs.upgrade() else {
            return;
        };

        let transport = Arc::clone(&self.transport);
        let timeout = self.poll_timeout;
        self.poll_task = Some(tokio::spawn(async move {
            let outcome = transport.exchange(body, timeout).await;
            let _ = inputs.send(Input::PollComplete {
                generation,
                outcome,
            });
        }));
    }

    fn spawn_retry(&mut self, token: u64, delay: Duration) {
        let Some(inputs) = self.inputs.upgrade() else {
            return;
        };
        if let Some(previous) = self.retry_task.take() {
            previous.abort();
        }
        self.retry_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inputs.send(Input::RetryTimer(token));
        }));
    }

    /// Serialize `request`. On failure the exchange is reported as failed
    /// so the engine's bookkeeping still advances.
    fn encode(
        &self,
        request: &Request,
        outcome_for: impl FnOnce(ExchangeOutcome) -> Input,
    ) -> Option<String> {
        match request.to_body(self.sys_info.as_deref()) {
            Ok(body) => Some(body),
            Err(e) => {
                error!(request_type = %request.request_type(), error = %e, "Failed to encode request");
                if let Some(inputs) = self.inputs.upgrade() {
                    let _ = inputs.send(outcome_for(ExchangeOutcome::Failed(e.to_string())));
                }
                None
            }
        }
    }
}
