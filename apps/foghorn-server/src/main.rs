mod config;
mod routes;
mod state;

use std::net::SocketAddr;

use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

use foghorn_core::{MemoryStore, NewsletterSettings, NewsletterStore};

use crate::config::ServerConfig;
use crate::routes::build_router;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "foghorn-server", about = "Newsletter broadcast sync service")]
struct Cli {
    /// Override the listen port from FOGHORN_PORT.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = ServerConfig::from_env();
    if let Some(port) = cli.port {
        config.port = port;
    }

    let store: std::sync::Arc<dyn NewsletterStore> = MemoryStore::new();
    // First boot: persist the environment-derived settings so admin edits
    // have a record to patch.
    if store.load_settings().await?.is_none() {
        store.save_settings(NewsletterSettings::from_env()).await?;
    }

    let state = AppState::new(store, &config);
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(port = config.port, env = ?config.env, "starting foghorn server");
    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service(),
    )
    .await?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
