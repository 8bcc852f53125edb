//! emo-proxy
//!
//! Reverse proxy for the emo robot's cloud services, with response overrides and a
//! speech-rewrite chain.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────────┐
//!                         │                      EMO PROXY                        │
//!     Device request      │  ┌────────┐    ┌──────────────────────────────────┐  │
//!     ────────────────────┼─▶│  http  │───▶│ /token /emo /home: interception  │──┼──▶ API host
//!                         │  │ server │    │   decode → resolve → merge →     │  │
//!                         │  │        │    │   speech chain → history         │──┼──▶ rewrite service
//!                         │  │        │    ├──────────────────────────────────┤  │
//!                         │  │        │───▶│ /download /tts /*: plain forward │──┼──▶ TTS / resource hosts
//!                         │  │        │    ├──────────────────────────────────┤  │
//!                         │  │        │───▶│ /time /app: local                │  │
//!                         │  └────────┘    └──────────────────────────────────┘  │
//!                         │                                                       │
//!                         │  ┌────────────────┐  ┌───────────┐  ┌──────────────┐  │
//!                         │  │ store (SQLite) │  │  archive  │  │ admin API    │  │
//!                         │  │ rules, history │  │  bodies   │  │ /proxy-api   │  │
//!                         │  └────────────────┘  └───────────┘  └──────────────┘  │
//!                         └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use emo_proxy::config::{load_or_default, ProxyConfig};
use emo_proxy::http::HttpServer;
use emo_proxy::lifecycle::{signals, startup, Shutdown};
use emo_proxy::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "emo-proxy", version, about = "Reverse proxy for emo cloud services")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, default_value = "emo-proxy.toml")]
    config: PathBuf,

    /// Listen port, overriding the configured bind address port
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database path, overriding the configured one
    #[arg(long)]
    db: Option<String>,
}

fn apply_overrides(config: &mut ProxyConfig, cli: &Cli) {
    if let Some(port) = cli.port {
        let mut addr: SocketAddr = config
            .listener
            .bind_address
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));
        addr.set_port(port);
        config.listener.bind_address = addr.to_string();
    }
    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (mut config, found) = load_or_default(&cli.config)?;
    apply_overrides(&mut config, &cli);

    logging::init(&config.observability)?;
    tracing::info!("emo-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    if !found {
        tracing::warn!(path = %cli.config.display(), "Config file not found, using defaults");
    }
    tracing::info!(
        bind_address = %config.listener.bind_address,
        api = %config.upstreams.api,
        database = config.database.enabled,
        archive = config.archive.enabled,
        "Configuration loaded"
    );

    if let Some(pid_file) = &config.lifecycle.pid_file {
        startup::write_pid_file(pid_file)?;
    }

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let store = startup::open_store(&config.database)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, store)?;
    let serving = tokio::spawn(server.run(listener, shutdown.subscribe()));

    signals::wait_for_signal().await;
    shutdown.trigger();
    serving.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
