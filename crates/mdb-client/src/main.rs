//! # mdb-client
//!
//! Command-line client for the MusicDB WebSocket API. Loads the WebUI
//! settings, opens a watched connection and sends or listens for envelopes.

#![deny(unsafe_code)]

mod render;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use clap::{Args, Parser, Subcommand};
use mdb_connection::{Connection, ConnectionConfig, ConnectionState};
use mdb_core::Response;
use mdb_core::logging::LogFormat;
use mdb_settings::MdbSettings;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// MusicDB command-line client.
#[derive(Parser, Debug)]
#[command(name = "mdb-client", about = "MusicDB WebSocket client")]
struct Cli {
    /// Settings file (defaults to `~/.musicdb/webui.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Server URL, e.g. `wss://musicdb.local:9000`.
    #[arg(long, global = true)]
    url: Option<String>,

    /// API key sent with every envelope.
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Log level or filter directive.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log as JSON objects instead of compact lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every notification and response until interrupted.
    Listen,
    /// Send a call; the server does not answer.
    Call {
        /// Server function name.
        fncname: String,
        /// Arguments as JSON.
        #[arg(long)]
        args: Option<String>,
    },
    /// Send a request and print the response.
    Request(ExchangeArgs),
    /// Send a request whose response goes to every client.
    Broadcast(ExchangeArgs),
}

#[derive(Args, Debug)]
struct ExchangeArgs {
    /// Server function name.
    fncname: String,
    /// Signature echoed back in the response.
    fncsig: String,
    /// Arguments as JSON.
    #[arg(long)]
    args: Option<String>,
    /// Pass-through data as JSON.
    #[arg(long)]
    pass: Option<String>,
    /// Seconds to wait for the response.
    #[arg(long, default_value = "10")]
    wait: u64,
}

impl Cli {
    fn load_settings(&self) -> Result<MdbSettings> {
        let mut settings = match &self.settings {
            Some(path) => mdb_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => mdb_settings::load_settings().context("Failed to load settings")?,
        };
        if let Some(url) = &self.url {
            settings.connection.url = Some(url.clone());
        }
        if let Some(key) = &self.api_key {
            settings.connection.api_key = Some(key.clone());
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    mdb_core::logging::init_subscriber(&settings.logging.level, format);

    let config = ConnectionConfig::from_settings(&settings);
    let connect_limit = config.connect_timeout + Duration::from_secs(1);
    let endpoint = config.endpoint.clone();
    let conn = Connection::new(config);
    log_connection_events(&conn);

    conn.connect();
    wait_connected(&conn, connect_limit)
        .await
        .with_context(|| format!("Failed to connect to {endpoint}"))?;

    let outcome = match cli.command {
        Command::Listen => listen(&conn).await,
        Command::Call { fncname, args } => call(&conn, &fncname, args.as_deref()),
        Command::Request(args) => exchange(&conn, Exchange::Request, &args).await,
        Command::Broadcast(args) => exchange(&conn, Exchange::Broadcast, &args).await,
    };

    shutdown(&conn).await;
    outcome
}

fn log_connection_events(conn: &Connection) {
    let _ = conn.add_connect_listener(|| info!("connected"));
    let _ = conn.add_disconnect_listener(|reason| info!(reason, "disconnected"));
    let _ = conn.add_error_listener(|error| warn!(%error, "connection error"));
    let _ = conn.add_watchdog_listener(|| warn!("server went quiet, reconnecting"));
}

async fn wait_connected(conn: &Connection, limit: Duration) -> Result<()> {
    let mut states = conn.watch_state();
    let state = *tokio::time::timeout(
        limit,
        states.wait_for(|s| {
            matches!(
                s,
                ConnectionState::Connected | ConnectionState::Disconnected | ConnectionState::Failed
            )
        }),
    )
    .await
    .context("timed out")?
    .context("connection task stopped")?;
    ensure!(state == ConnectionState::Connected, "connection {state}");
    Ok(())
}

async fn listen(conn: &Connection) -> Result<()> {
    let _ = conn.add_notification_listener(|n| println!("{}", render::notification_line(n)));
    let _ = conn.add_message_listener(|r| println!("{}", render::response_line(r)));

    let mut states = conn.watch_state();
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("interrupted");
            Ok(())
        }
        _ = states.wait_for(|s| matches!(s, ConnectionState::Disconnected | ConnectionState::Failed)) => {
            bail!("connection {}", conn.state())
        }
    }
}

fn call(conn: &Connection, fncname: &str, args: Option<&str>) -> Result<()> {
    let arguments = render::parse_payload("args", args)?;
    ensure!(conn.call(fncname, arguments), "Failed to send {fncname}");
    Ok(())
}

#[derive(Clone, Copy, Debug)]
enum Exchange {
    Request,
    Broadcast,
}

async fn exchange(conn: &Connection, kind: Exchange, args: &ExchangeArgs) -> Result<()> {
    let arguments = render::parse_payload("args", args.args.as_deref())?;
    let pass = render::parse_payload("pass", args.pass.as_deref())?;

    let (tx, rx) = oneshot::channel::<Response>();
    let reply = Mutex::new(Some(tx));
    let (name, sig) = (args.fncname.clone(), args.fncsig.clone());
    let handle = conn.add_message_listener(move |response| {
        if response.matches(&name, &sig) {
            if let Some(tx) = reply.lock().take() {
                let _ = tx.send(response.clone());
            }
        }
    });

    let sent = match kind {
        Exchange::Request => conn.request(&args.fncname, &args.fncsig, arguments, pass),
        Exchange::Broadcast => conn.broadcast(&args.fncname, &args.fncsig, arguments, pass),
    };
    ensure!(sent, "Failed to send {}", args.fncname);

    let waited = tokio::time::timeout(Duration::from_secs(args.wait), rx).await;
    let _ = handle.remove();
    let response = waited
        .with_context(|| {
            format!(
                "No response to {}:{} within {}s",
                args.fncname, args.fncsig, args.wait
            )
        })?
        .context("Connection dropped before the response arrived")?;

    println!("{}", render::response_line(&response));
    Ok(())
}

async fn shutdown(conn: &Connection) {
    conn.disconnect();
    let mut states = conn.watch_state();
    let closed = tokio::time::timeout(
        Duration::from_secs(2),
        states.wait_for(|s| !matches!(s, ConnectionState::Connected | ConnectionState::Closing)),
    )
    .await;
    if closed.is_err() {
        warn!("connection did not close in time");
    }
}
