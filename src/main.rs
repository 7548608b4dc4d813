//! Steam Deck telemetry bridge - Main Entry Point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use steamdeck_mqtt::config::{default_settings_path, Settings};
use steamdeck_mqtt::control::{self, HostResponse};
use steamdeck_mqtt::observability::init_default_logging;
use steamdeck_mqtt::{BridgeError, DeckBridge, MqttClient};
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info};

/// Publishes Steam Deck telemetry to Home Assistant over MQTT
#[derive(Parser)]
#[command(name = "steamdeck-mqtt")]
#[command(about = "Steam Deck telemetry bridge for Home Assistant")]
#[command(version)]
struct Cli {
    /// Settings file path
    #[arg(short, long, value_name = "FILE", env = "STEAMDECK_MQTT_SETTINGS")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, publish telemetry and serve the control API until stopped
    Run,
    /// Validate the settings file
    Settings {
        /// Print the settings with the password masked
        #[arg(long)]
        show: bool,
    },
    /// Try the configured broker with a separate client
    TestConnection,
    /// Print one telemetry snapshot as JSON
    Snapshot,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!(
        "Starting Steam Deck telemetry bridge v{}",
        env!("CARGO_PKG_VERSION")
    );

    let settings_path = cli.settings.unwrap_or_else(default_settings_path);
    let settings = Settings::load_or_default(&settings_path);

    let result = match cli.command {
        Commands::Run => run_bridge(settings, settings_path).await,
        Commands::Settings { show } => handle_settings_command(&settings, show),
        Commands::TestConnection => test_connection(&settings).await,
        Commands::Snapshot => print_snapshot(settings, settings_path).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

async fn run_bridge(
    settings: Settings,
    settings_path: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let bridge = Arc::new(DeckBridge::system(settings, Some(settings_path)));
    bridge.start().await;

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let addr = control::control_addr(control::control_port());
    let server = tokio::spawn(control::serve(bridge.clone(), addr, async {
        let _ = stop_rx.await;
    }));

    // Set up signal handling for graceful shutdown
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!("Bridge is running");

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }

    let _ = stop_tx.send(());
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Control API error: {}", e),
        Err(e) => error!("Control API task failed: {}", e),
    }

    bridge.shutdown().await;
    info!("Application shutdown complete");
    Ok(())
}

fn handle_settings_command(
    settings: &Settings,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    settings.validate()?;
    if show {
        println!("{}", serde_json::to_string_pretty(&settings.redacted())?);
    }
    info!("Settings validation complete");
    Ok(())
}

async fn test_connection(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let result = MqttClient::test_connection(settings.connection_settings())
        .await
        .map_err(BridgeError::from);
    let response = match &result {
        Ok(()) => HostResponse::ok(),
        Err(e) => HostResponse::failed(e),
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    result.map_err(Into::into)
}

async fn print_snapshot(
    settings: Settings,
    settings_path: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let bridge = DeckBridge::system(settings, Some(settings_path));
    let snapshot = bridge.get_telemetry().await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
