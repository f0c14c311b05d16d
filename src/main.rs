//! Tank Wars Server
//!
//! Loads the game settings, binds the listening socket and serves the
//! arena until Ctrl-C.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tank_wars::{GameServer, GameSettings, ServerConfig, DEFAULT_PORT, VERSION};

/// Command line arguments.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Game settings file (JSON). Built-in defaults are used when omitted.
    #[clap(short, long)]
    settings: Option<PathBuf>,
    /// Address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// World RNG seed (random when omitted)
    #[clap(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");
    let args = Args::parse();

    let settings = match &args.settings {
        Some(path) => match GameSettings::from_file(path) {
            Ok(settings) => settings,
            Err(e) => {
                error!("Failed to load settings from {}: {}", path.display(), e);
                return Err(e).with_context(|| format!("loading {}", path.display()));
            }
        },
        None => GameSettings::default(),
    };

    let bind_addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.host, args.port))?;

    let seed = args.seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default()
    });

    info!("Tank Wars Server v{}", VERSION);
    info!(
        "Universe {} wide, {} ms/frame, {} walls, seed {}",
        settings.universe_size,
        settings.ms_per_frame,
        settings.walls.len(),
        seed
    );

    let config = ServerConfig {
        bind_addr,
        ..ServerConfig::default()
    };
    let server = GameServer::new(config, settings, seed)?;

    let listener = server.bind().await?;
    let handle = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.shutdown();
        }
    });

    server.serve(listener).await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging. `RUST_LOG` overrides the default level.
fn init_tracing(default_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
