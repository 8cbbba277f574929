//! cantor-server - project session and render service
//!
//! Holds one active vocal-synthesis project, exports it to WAV, and converts
//! MIDI scores into projects over a local HTTP API.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use cantor_common::config::{
    default_config_file, resolve_config, write_toml_config, ConfigOverrides, ServerConfig,
    TomlConfig, DEFAULT_PORT,
};
use cantor_common::events::EventBus;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cantor_server::services::SingerCatalog;
use cantor_server::{build_router, AppState, Collaborators};

/// Command-line arguments for cantor-server
#[derive(Parser, Debug)]
#[command(name = "cantor-server")]
#[command(about = "Project session and render service for Cantor")]
#[command(version)]
struct Args {
    /// Port to listen on; an invalid value falls back to the default
    #[arg(short, long, env = "CANTOR_PORT")]
    port: Option<String>,

    /// Address to bind
    #[arg(long, env = "CANTOR_BIND_ADDRESS")]
    bind_address: Option<String>,

    /// Directory whose sub-directories are installed singers
    #[arg(long, env = "CANTOR_SINGERS_PATH")]
    singers_path: Option<PathBuf>,

    /// TOML config file (default: <config dir>/cantor/cantor-server.toml)
    #[arg(short, long, env = "CANTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set (error, warn, info, debug, trace)
    #[arg(long, env = "CANTOR_LOG_LEVEL")]
    log_level: Option<String>,

    /// Write a default config file and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.init_config {
        let path = args
            .config
            .clone()
            .or_else(default_config_file)
            .context("No config directory available on this platform")?;
        write_toml_config(&TomlConfig::default(), &path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let port = args.port.as_deref().map(parse_port);
    let overrides = ConfigOverrides {
        bind_address: args.bind_address.clone(),
        port: port.as_ref().map(|p| p.clone().unwrap_or(DEFAULT_PORT)),
        singers_path: args.singers_path.clone(),
        log_level: args.log_level.clone(),
    };
    let config = resolve_config(args.config.as_deref(), overrides)
        .context("Failed to resolve configuration")?;

    init_tracing(&config)?;

    if let Some(Err(raw)) = &port {
        warn!("Invalid port '{}', using default port {}", raw, DEFAULT_PORT);
    }

    info!("Starting cantor-server v{}", env!("CARGO_PKG_VERSION"));
    match &config.config_file {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("No config file, using defaults"),
    }
    info!("Singers: {}", config.singers_path.display());

    let singers = SingerCatalog::scan(&config.singers_path);
    let event_bus = EventBus::new(config.event_capacity);
    let state = AppState::new(singers, event_bus, Collaborators::defaults(config.sample_rate));
    let orchestrator = state.orchestrator.clone();

    let app = build_router(state);

    let addr = config.socket_addr_string();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Type 'exit' to stop the server");

    let stdin_exit = CancellationToken::new();
    tokio::spawn(watch_stdin(stdin_exit.clone()));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(stdin_exit))
        .await
        .context("Server error")?;

    if orchestrator.cancel_active() {
        info!("Cancelled in-flight export");
    }
    info!("Server shutdown complete");
    Ok(())
}

/// Parse a port override; the raw text comes back on failure
fn parse_port(raw: &str) -> std::result::Result<u16, String> {
    match raw.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(raw.to_string()),
    }
}

fn init_tracing(config: &ServerConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        format!("cantor_server={level},cantor_common={level},tower_http={level}").into()
    });

    let (file_layer, stderr_layer) = match &config.logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (Some(layer), None)
        }
        None => (None, Some(tracing_subscriber::fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}

/// Cancel `exit` when the line "exit" is typed; EOF leaves the server running
async fn watch_stdin(exit: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().eq_ignore_ascii_case("exit") {
                    exit.cancel();
                    return;
                }
                if !line.trim().is_empty() {
                    println!("Type 'exit' to stop the server");
                }
            }
            Ok(None) => return,
            Err(e) => {
                warn!("Stopped reading stdin: {}", e);
                return;
            }
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal(stdin_exit: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
        _ = stdin_exit.cancelled() => {
            info!("Received exit command, shutting down");
        },
    }
}
