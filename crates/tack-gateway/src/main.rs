//! # tack-gateway
//!
//! Tack gateway binary — wires settings, auth, the WebSocket server, and
//! the upstream relay together and runs until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use tack_server::auth::{AllowAllPolicy, JwtTokenVerifier};
use tack_server::config::ServerConfig;
use tack_server::relay::{RelayConfig, UpstreamRelay};
use tack_server::server::TackServer;
use tack_server::websocket::broadcast::RoomBroadcaster;
use tack_server::websocket::registry::ClientRegistry;
use tack_settings::{LoggingSettings, load_settings, load_settings_from_path};

/// Tack real-time gateway server.
#[derive(Parser, Debug)]
#[command(name = "tack-gateway", about = "Tack real-time gateway server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to a settings file (defaults to `~/.tack/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

fn init_tracing(settings: &LoggingSettings) {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.clone()));

    if settings.json {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init();
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact();
        let _ = subscriber.try_init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings = match &args.settings {
        Some(path) => load_settings_from_path(path).unwrap_or_default(),
        None => load_settings().unwrap_or_default(),
    };
    init_tracing(&settings.logging);

    if settings.auth.jwt_secret.is_empty() && !settings.auth.allow_anonymous {
        anyhow::bail!(
            "auth.jwtSecret is empty; set it (or TACK_JWT_SECRET), or enable auth.allowAnonymous"
        );
    }

    let mut config = ServerConfig::from_settings(&settings);
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let registry = Arc::new(ClientRegistry::new());
    let broadcaster = Arc::new(RoomBroadcaster::new(Arc::clone(&registry)));
    let metrics_handle = tack_server::metrics::install_recorder();

    let (relay, relay_handle) = if settings.relay.enabled {
        let (relay, handle) = UpstreamRelay::new(
            RelayConfig::from_settings(&settings.relay),
            Arc::clone(&broadcaster),
            Arc::clone(&registry),
        );
        (Some(relay), Some(handle))
    } else {
        (None, None)
    };

    let server = TackServer::new(
        config,
        registry,
        broadcaster,
        relay_handle,
        Arc::new(JwtTokenVerifier::new(&settings.auth.jwt_secret)),
        Arc::new(AllowAllPolicy),
        metrics_handle,
    );

    if let Some(relay) = relay {
        tracing::info!(url = %settings.relay.upstream_url, "starting upstream relay");
        drop(tokio::spawn(relay.run(server.shutdown().token())));
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("tack gateway listening on http://{addr} (ws: ws://{addr}/ws)");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("Shutting down...");
    server.shutdown().shutdown();
    let _ = handle.await;
    tracing::info!("Shutdown complete");
    Ok(())
}
