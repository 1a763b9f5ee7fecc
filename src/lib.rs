//! # NPJWI Client - Conversational Agent Protocol Engine
//!
//! Client-side engine for NPJWI, a JSON-over-HTTP protocol between a client
//! application and a conversational agent server. The client opens a
//! session, pushes user input through a strictly serialized send queue, and
//! receives agent messages through a long-poll loop.
//!
//! ## Protocol Overview
//!
//! Every exchange is one HTTP POST of a JSON request carrying a
//! `requestType`; the server answers with a JSON frame carrying a
//! `responseType`. Two logical channels share the endpoint:
//!
//! ```text
//! Client                                   NPJWI Server
//!    |                                          |
//!    |--- StartSession ------------------------>|   send channel
//!    |<-- SessionStarted (sessionID) -----------|   (one in flight)
//!    |                                          |
//!    |--- PullAgentMessage (cursor) ----------->|   receive channel
//!    |         ... held up to 45 s ...          |   (one poll pending)
//!    |<-- AgentMessage | TimeoutNoMessage ------|
//!    |                                          |
//!    |--- PushClientMessage (client_0) -------->|
//!    |<-- ReceivedClientMessage ----------------|
//!    |                                          |
//!    |--- EndSession -------------------------->|
//!    |<-- SessionEnded -------------------------|
//! ```
//!
//! ### State Machine
//!
//! ```text
//!     [Uninitialized] ──start()──> [Connecting] ──SessionStarted──> [Connected]
//!                                      │  ▲                            │
//!                         server error │  │ retry timer                │ end() / fatal error
//!                                      v  │                            v
//!                                  (retry armed)                 [Disconnected]
//!                                                                      │
//!                               liveness Inactive ──────────────> [Expired]
//! ```
//!
//! ## Layers
//!
//! - [`engine`]: sans-IO state machine. Inputs are method calls and exchange
//!   outcomes; outputs are [`Effect`]s the caller performs.
//! - [`client`]: tokio driver that performs effects over a [`Transport`]
//!   and broadcasts [`ClientEvent`]s.
//! - [`transport`]: the HTTP exchange seam ([`HttpTransport`] on reqwest).
//! - [`protocol`]: request and response frames.
//! - [`classifier`]: error codes, categories and user-facing descriptions.
//! - [`config`]: endpoint, timeouts, retry budget and session profile.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use npjwi::{Client, ClientConfig, ClientEvent};
//!
//! # async fn demo() -> npjwi::Result<()> {
//! let config = ClientConfig::with_endpoint("https://agent.example.com/npjwi");
//! let client = Client::connect(config)?;
//! let mut events = client.subscribe();
//!
//! client.start().await?;
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         ClientEvent::SessionStarted { .. } => {
//!             client.send_text("What can you do?").await?;
//!         }
//!         ClientEvent::AgentMessage(message) => println!("{:?}", message.content),
//!         ClientEvent::Error(error) => eprintln!("{}: {}", error.error_code, error.error_message),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Driving the engine directly
//!
//! ```rust
//! use npjwi::{ClientConfig, Effect, Engine};
//!
//! let mut engine = Engine::new(ClientConfig::with_endpoint("http://localhost:9000/"));
//! engine.start().unwrap();
//!
//! let effects = engine.take_effects();
//! assert!(effects.iter().any(|e| matches!(e, Effect::Send(_))));
//! ```

pub mod classifier;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod protocol;
pub mod transport;

// Re-exports for convenience
pub use classifier::{categorize, describe, ErrorCategory, ErrorDescription};
pub use client::Client;
pub use config::{ClientConfig, RetryConfig, SessionProfile, TransportConfig};
pub use engine::{Effect, Engine, Restart, SessionState, Snapshot};
pub use error::{NpjwiError, Result};
pub use events::{ClassifiedError, ClientEvent, UtilityData};
pub use protocol::{parse_frame, AgentMessage, Channel, Request, RequestType, Response, ResponseType, UserInput};
pub use transport::{ExchangeOutcome, HttpTransport, Transport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
