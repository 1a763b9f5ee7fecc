//! NPJWI command-line client.
//!
//! # Commands
//!
//! - `chat` - Open a session and talk to the agent from stdin
//! - `status` - Check whether a session is still alive
//! - `data` - Fetch an application or assistant data item

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use npjwi::{
    classifier::describe,
    protocol::{GetAppData, GetAssistantData, IsSessionActive, Request, Response},
    Client, ClientConfig, ClientEvent, VERSION,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "npjwi")]
#[command(version = VERSION)]
#[command(about = "NPJWI client - talk to a conversational agent server", long_about = None)]
struct Cli {
    /// Config file (default: <config_dir>/npjwi/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Endpoint URL or environment alias
    #[arg(short, long, global = true)]
    endpoint: Option<String>,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a session and chat from stdin (`/end` quits)
    Chat {
        /// Print raw agent message JSON
        #[arg(long)]
        raw: bool,
    },

    /// Ask the server whether a session is active
    Status {
        /// Session to check
        #[arg(short, long)]
        session_id: String,
    },

    /// Fetch a data item
    Data {
        /// Data source
        #[arg(value_enum)]
        source: DataSource,

        /// Data item ID
        data_id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DataSource {
    App,
    Assistant,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config, cli.endpoint)?;

    match cli.command {
        Commands::Chat { raw } => cmd_chat(config, raw).await,
        Commands::Status { session_id } => cmd_status(config, session_id).await,
        Commands::Data { source, data_id } => cmd_data(config, source, data_id).await,
    }
}

/// File (explicit or default location), then environment, then flags
fn load_config(path: Option<PathBuf>, endpoint: Option<String>) -> anyhow::Result<ClientConfig> {
    let file = match path {
        Some(path) => ClientConfig::from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => match ClientConfig::default_path().filter(|p| p.exists()) {
            Some(path) => ClientConfig::from_file(path)?,
            None => ClientConfig::default(),
        },
    };

    let mut config = file.merge(ClientConfig::from_env());
    if let Some(endpoint) = endpoint {
        config.endpoint = endpoint;
    }
    if !config.has_endpoint() {
        anyhow::bail!("No endpoint configured. Use --endpoint, NPJWI_URL or a config file.");
    }
    Ok(config)
}

async fn cmd_chat(config: ClientConfig, raw: bool) -> anyhow::Result<()> {
    let client = Client::connect(config)?;
    let mut events = client.subscribe();

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if !print_event(&event, raw) {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => eprintln!("[{missed} events dropped]"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    client.start().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let sent = match line.split_once(' ').unwrap_or((line, "")) {
            ("/end", _) => break,
            ("/gui", id) => client.send_gui(id, None).await.map(drop),
            ("/hint", value) => client.select_hint(value).await.map(drop),
            ("/item", uid) => client.select_item(uid, true).await.map(drop),
            ("/gps", fix) => client.send_gps(fix).await.map(drop),
            ("/alive", _) => client.check_liveness().await.map(drop),
            _ => client.send_text(line).await.map(drop),
        };
        if let Err(e) = sent {
            eprintln!("! {e}");
        }
    }

    client.end().await?;
    // Let the EndSession ack arrive before tearing down
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    client.shutdown().await;
    printer.abort();
    Ok(())
}

/// Print one event. Returns false once the session is over.
fn print_event(event: &ClientEvent, raw: bool) -> bool {
    match event {
        ClientEvent::SessionStarted { session_id, .. } => {
            eprintln!("* session {session_id} started");
        }
        ClientEvent::AgentMessage(message) => {
            if raw {
                println!("{}", serde_json::to_string(message).unwrap_or_default());
            } else {
                print_agent_content(&message.content);
            }
        }
        ClientEvent::RetryScheduled {
            attempt,
            max_retries,
            delay,
        } => eprintln!("* retrying in {delay:?} ({attempt}/{max_retries})"),
        ClientEvent::Error(error) => {
            let text = describe(&error.error_code);
            eprintln!("! {}: {} ({})", text.title, text.message, error.error_code);
        }
        ClientEvent::SessionExpired => eprintln!("* session expired"),
        ClientEvent::SessionEnded { session_id } => {
            eprintln!("* session {session_id} ended");
            return false;
        }
        _ => {}
    }
    true
}

fn print_agent_content(content: &serde_json::Map<String, serde_json::Value>) {
    let visuals: Vec<&str> = content
        .get("say")
        .and_then(serde_json::Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| item.get("visual").and_then(serde_json::Value::as_str))
        .collect();

    if visuals.is_empty() {
        println!("{}", serde_json::Value::Object(content.clone()));
    } else {
        for visual in visuals {
            println!("> {visual}");
        }
    }
}

async fn cmd_status(config: ClientConfig, session_id: String) -> anyhow::Result<()> {
    let app_id = config.profile.app_id.clone();
    let client = Client::connect(config)?;

    let response = client
        .call_direct(Request::IsSessionActive(IsSessionActive { app_id, session_id }))
        .await;
    client.shutdown().await;

    match response? {
        Response::SessionStatus(status) => println!("{}: {:?}", status.session_id, status.status),
        Response::Error(error) => anyhow::bail!("{}: {}", error.error_code, error.error_message),
        other => anyhow::bail!("Unexpected response: {}", other.response_type()),
    }
    Ok(())
}

async fn cmd_data(config: ClientConfig, source: DataSource, data_id: String) -> anyhow::Result<()> {
    let profile = config.profile.clone();
    let client = Client::connect(config)?;

    let request = match source {
        DataSource::App => Request::GetAppData(GetAppData {
            app_id: profile.app_id,
            data_id,
            user_id: None,
        }),
        DataSource::Assistant => Request::GetAssistantData(GetAssistantData {
            app_id: profile.app_id,
            access_code: profile.access_code,
            data_id,
        }),
    };
    let response = client.call_direct(request).await;
    client.shutdown().await;

    match response? {
        Response::AppData(data) => println!("{}", data.app_data),
        Response::AssistantData(data) => println!("{}", data.assistant_data),
        Response::Error(error) => anyhow::bail!("{}: {}", error.error_code, error.error_message),
        other => anyhow::bail!("Unexpected response: {}", other.response_type()),
    }
    Ok(())
}
