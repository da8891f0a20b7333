//! # spectate-manager
//!
//! Command-line front end: wires settings, logging and the spectate client,
//! and prints results as JSON on stdout.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use spectate_client::{ClientConfig, SessionEvent, SpectateClient};
use spectate_core::logging::init_subscriber;
use spectate_settings::{
    CaptureProtocol, CaptureSettings, SpectateSettings, load_settings_from_path,
    read_settings_file, save_settings_to_path, settings_path,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Manage which Slippi broadcasts are being spectated.
#[derive(Parser, Debug)]
#[command(name = "spectate-manager", about = "Manage spectated Slippi broadcasts")]
struct Cli {
    /// Settings file (defaults to `~/.spectate-manager/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List broadcasts available to spectate.
    Broadcasts,
    /// Show which broadcasts are routed into which dolphin.
    Spectating,
    /// Start spectating a broadcast and print the dolphin id showing it.
    Spectate {
        /// Broadcast to spectate.
        broadcast_id: String,
        /// Dolphin id to ask for.
        #[arg(long)]
        dolphin_id: Option<String>,
    },
    /// Log mapping changes until the connection closes or Ctrl-C.
    Watch,
    /// Read or change persisted settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print the effective settings.
    Show,
    /// Persist the spectate remote control endpoint.
    SetEndpoint {
        /// WebSocket URL, e.g. `ws://127.0.0.1:49809`.
        url: String,
    },
    /// Persist capture-control connection settings.
    SetCapture(CaptureEdit),
}

#[derive(clap::Args, Debug, Default, PartialEq, Eq)]
struct CaptureEdit {
    /// WebSocket scheme.
    #[arg(long, value_enum)]
    protocol: Option<ProtocolArg>,
    /// Host name or IP.
    #[arg(long)]
    address: Option<String>,
    /// Port.
    #[arg(long)]
    port: Option<String>,
    /// Password; pass an empty string to clear it.
    #[arg(long)]
    password: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ProtocolArg {
    Ws,
    Wss,
}

impl From<ProtocolArg> for CaptureProtocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Ws => Self::Ws,
            ProtocolArg::Wss => Self::Wss,
        }
    }
}

impl CaptureEdit {
    fn apply(self, capture: &mut CaptureSettings) {
        if let Some(protocol) = self.protocol {
            capture.protocol = protocol.into();
        }
        if let Some(address) = self.address {
            capture.address = address;
        }
        if let Some(port) = self.port {
            capture.port = port;
        }
        if let Some(password) = self.password {
            capture.password = (!password.is_empty()).then_some(password);
        }
    }
}

fn client_config(settings: &SpectateSettings) -> ClientConfig {
    ClientConfig {
        request_timeout: Duration::from_millis(settings.spectate.request_timeout_ms),
        dolphin_id_prefix: settings.spectate.dolphin_id_prefix.clone(),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn connect(settings: &SpectateSettings) -> Result<SpectateClient> {
    let client = SpectateClient::new(client_config(settings));
    client
        .connect(&settings.spectate.endpoint)
        .await
        .with_context(|| {
            format!(
                "Failed to connect to spectate remote control at {}",
                settings.spectate.endpoint
            )
        })?;
    Ok(client)
}

async fn watch(client: &SpectateClient) -> Result<()> {
    let mut events = client.subscribe();
    print_json(&client.currently_spectated()?)?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::DolphinClosed { dolphin_id, broadcast_id }) => {
                    info!(dolphin_id = %dolphin_id, ?broadcast_id, "dolphin closed");
                    print_json(&client.currently_spectated()?)?;
                }
                Ok(SessionEvent::Disconnected) | Err(RecvError::Closed) => {
                    bail!("connection to spectate remote control closed");
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "event stream lagged");
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                client.disconnect();
                return Ok(());
            }
        }
    }
}

fn edit_settings(path: &Path, edit: impl FnOnce(&mut SpectateSettings)) -> Result<()> {
    // File layer only, so environment overrides are not persisted.
    let mut settings = read_settings_file(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    edit(&mut settings);
    save_settings_to_path(path, &settings)
        .with_context(|| format!("Failed to save settings to {}", path.display()))?;
    info!(path = %path.display(), "settings saved");
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let path = cli.settings.unwrap_or_else(settings_path);
    let settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    init_subscriber(&settings.logging.level);

    match cli.command {
        Command::Broadcasts => {
            let client = connect(&settings).await?;
            print_json(&client.list_broadcasts().await?)?;
            client.disconnect();
        }
        Command::Spectating => {
            let client = connect(&settings).await?;
            print_json(&client.currently_spectated()?)?;
            client.disconnect();
        }
        Command::Spectate {
            broadcast_id,
            dolphin_id,
        } => {
            let client = connect(&settings).await?;
            let actual = client
                .spectate_broadcast(&broadcast_id, dolphin_id.as_deref())
                .await
                .with_context(|| format!("Failed to spectate broadcast {broadcast_id}"))?;
            println!("{actual}");
            client.disconnect();
        }
        Command::Watch => {
            let client = connect(&settings).await?;
            watch(&client).await?;
        }
        Command::Settings { action } => match action {
            SettingsAction::Show => print_json(&settings)?,
            SettingsAction::SetEndpoint { url } => {
                edit_settings(&path, |s| s.spectate.endpoint = url)?;
            }
            SettingsAction::SetCapture(edit) => {
                edit_settings(&path, |s| edit.apply(&mut s.capture))?;
            }
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    run(Cli::parse()).await
}
