//! rds-chat - terminal client for the RDS messaging channel
//!
//! Reads lines from stdin and sends them as chat messages; prints inbound
//! messages, connection status changes and errors as they happen.

use clap::{Parser, Subcommand};
use rds_messaging::observability::init_default_logging;
use rds_messaging::{
    ClientConfig, ClientEvent, ConnectionSession, Delivery, SendError, WebSocketConnector,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

/// Resilient real-time messaging client
#[derive(Parser)]
#[command(name = "rds-chat")]
#[command(about = "Terminal client for the RDS messaging channel")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Server endpoint, overrides the configuration file
    #[arg(long, env = "RDS_ENDPOINT")]
    endpoint: Option<String>,

    /// User id, overrides the configuration file
    #[arg(long, env = "RDS_USER_ID")]
    user: Option<String>,

    /// Session id, overrides the configuration file
    #[arg(long, env = "RDS_SESSION_ID")]
    session: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and chat over stdin/stdout
    Run,
    /// Validate configuration
    Config {
        /// Show the resolved configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting rds-chat v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_chat(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

/// Configuration from `--config`, a default location, or the command line alone
fn load_configuration(cli: &Cli) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let from_file = match &cli.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Some(ClientConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = ["rds-chat.toml", "config/rds-chat.toml"];
            match default_paths
                .iter()
                .map(PathBuf::from)
                .find(|path| path.exists())
            {
                Some(path) => {
                    info!("Loading configuration from: {}", path.display());
                    Some(ClientConfig::load_from_file(&path)?)
                }
                None => None,
            }
        }
    };

    let mut config = match (from_file, &cli.endpoint, &cli.user, &cli.session) {
        (Some(config), ..) => config,
        (None, Some(endpoint), Some(user), Some(session)) => {
            ClientConfig::new(endpoint.clone(), user.clone(), session.clone())
        }
        (None, ..) => {
            return Err(
                "No configuration file found. Provide one with -c/--config, create rds-chat.toml, \
                 or pass --endpoint, --user and --session"
                    .into(),
            )
        }
    };

    if let Some(endpoint) = &cli.endpoint {
        config.session.endpoint = endpoint.clone();
    }
    if let Some(user) = &cli.user {
        config.session.user_id = user.clone();
    }
    if let Some(session) = &cli.session {
        config.session.session_id = session.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn run_chat(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Connecting to {} as {}",
        config.session.endpoint, config.session.user_id
    );

    let auto_connect = config.session.auto_connect;
    let session = ConnectionSession::spawn(config, Arc::new(WebSocketConnector::new()));
    if !auto_connect {
        println!("* auto_connect is off, type /connect to connect");
    }

    let mut events = session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down gracefully...");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} session events", skipped),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !handle_line(&session, line.trim()).await? {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    info!("Application shutdown initiated");
    session.shutdown().await?;
    Ok(())
}

/// Returns false when the user asked to quit
async fn handle_line(
    session: &ConnectionSession,
    line: &str,
) -> Result<bool, Box<dyn std::error::Error>> {
    match line {
        "/quit" => return Ok(false),
        "/connect" => session.connect()?,
        "/disconnect" => session.disconnect()?,
        "/status" => {
            let status = session.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        "" => {}
        content => match session.send_message(content).await {
            Ok(Delivery::Sent(_)) => {}
            Ok(Delivery::Queued(id)) => println!("* {id} queued until reconnected"),
            Err(SendError::SessionClosed) => return Ok(false),
            Err(e) => println!("! {e}"),
        },
    }
    Ok(true)
}

fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::MessageReceived(message) => {
            let sender = message
                .username
                .as_deref()
                .or(message.user_id.as_deref())
                .unwrap_or("?");
            println!("<{sender}> {}", message.content);
        }
        ClientEvent::SystemNotice(message) => println!("* {}", message.content),
        ClientEvent::StatusChanged(state) => println!("* status: {state}"),
        ClientEvent::TypingChanged(users) if users.is_empty() => {}
        ClientEvent::TypingChanged(users) => {
            let names: Vec<&str> = users.iter().map(|u| u.display_name.as_str()).collect();
            println!("* typing: {}", names.join(", "));
        }
        ClientEvent::Error(error) => println!("! {error}"),
    }
}

fn handle_config_command(
    config: &ClientConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", config.to_toml_string()?);
    }

    info!("Configuration validation complete");
    Ok(())
}
