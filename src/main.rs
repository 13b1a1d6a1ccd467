//! Realtime client - Main Entry Point

use chrono::Utc;
use clap::{Parser, Subcommand};
use realtime_client::config::RealtimeConfig;
use realtime_client::observability::{init_default_logging, init_logging, LogFormat};
use realtime_client::protocol::topics::{
    IRIS_SUB_RESPONSE, MESSAGE_SYNC, REALTIME_SUB, SEND_MESSAGE_RESPONSE,
};
use realtime_client::protocol::SessionNegotiator;
use realtime_client::realtime::{
    ClientEvent, ConnectionState, DecodedMessage, Handler, HandlerError, HandlerRegistry,
    JsonParser, ParserRegistry, RealtimeClient,
};
use realtime_client::transport::{event_channel, mqtt::RumqttTransport};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn, Level};

/// Realtime push-messaging client
#[derive(Parser)]
#[command(name = "realtime-client")]
#[command(about = "MQTT realtime push-messaging client")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (overrides LOG_LEVEL)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and log every decoded message until interrupted
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Print the handshake payload with the device secret redacted
    Handshake,
}

/// Modules produced by the JSON parser per response topic
const LOGGED_MODULES: &[(&str, &str)] = &[
    (SEND_MESSAGE_RESPONSE, "send_message_response"),
    (IRIS_SUB_RESPONSE, "iris_sub_response"),
    (MESSAGE_SYNC, "message_sync"),
    (REALTIME_SUB, "realtime_sub"),
];

/// Handler that writes each decoded message to the log
struct LoggingHandler;

impl Handler for LoggingHandler {
    fn handle(&self, message: &DecodedMessage) -> Result<(), HandlerError> {
        info!(module = %message.module, data = %message.data, "Realtime message");
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.verbose {
        0 => init_default_logging(),
        1 => init_logging(Level::DEBUG, LogFormat::Compact, false),
        _ => init_logging(Level::TRACE, LogFormat::Compact, true),
    }

    info!("Starting realtime client v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_client(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::Handshake => print_handshake(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<RealtimeConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(RealtimeConfig::load_from_file(path)?);
    }

    for path_str in ["realtime.toml", "config/realtime.toml"] {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(RealtimeConfig::load_from_file(&path)?);
        }
    }

    Err("No configuration file found. Provide one with -c/--config or create realtime.toml".into())
}

async fn run_client(config: RealtimeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (events_tx, events_rx) = event_channel();
    let transport = RumqttTransport::new(events_tx);

    let logging_handler = Arc::new(LoggingHandler);
    let (parsers, handlers) = LOGGED_MODULES.iter().fold(
        (ParserRegistry::new(), HandlerRegistry::new()),
        |(parsers, handlers), (topic, module)| {
            (
                parsers.with(*topic, Arc::new(JsonParser::new(*module))),
                handlers.with(*module, logging_handler.clone()),
            )
        },
    );

    let client = RealtimeClient::from_config(transport, &config)?
        .with_parsers(parsers)
        .with_handlers(handlers);
    let (handle, task) = client.spawn(events_rx);

    let mut client_events = handle.subscribe();
    tokio::spawn(async move {
        loop {
            match client_events.recv().await {
                Ok(ClientEvent::Warning(message)) => warn!(message = %message, "Client warning"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Client warnings dropped")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    handle.start().await?;
    info!(user_id = config.account.user_id, "Client running, press Ctrl-C to stop");

    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
        _ = handle.wait_for_state(ConnectionState::ShutDown) => {
            error!("Client shut down on its own");
        }
    }

    handle.stop().await;
    task.await?;
    info!("Client stopped");
    Ok(())
}

fn handle_config_command(
    config: &RealtimeConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}

fn print_handshake(config: &RealtimeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let device = config.device_identity()?;
    let secret = serde_json::to_string(&device.device_secret)?;
    let negotiator = SessionNegotiator::new(
        device,
        config.account.user_id,
        config.feature_flags(),
        config.app_info(),
    )?;

    let handshake = negotiator.build(Utc::now())?;
    println!("{}", handshake.replace(&secret, "\"***\""));
    Ok(())
}
