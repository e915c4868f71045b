use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use lakeview_api::config;
use lakeview_api::handlers;
use lakeview_api::integrations::DefaultIntegrationFactory;
use lakeview_api::jobs::{JobQueue, MemoryJobQueue, PgJobQueue};
use lakeview_api::state::AppState;
use lakeview_api::store::memory::MemoryStore;
use lakeview_api::store::postgres::PgDocumentStore;

#[derive(Parser)]
#[command(name = "lakeview-api", version, about = "Data source management API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Override the configured listen port
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let port_override = match cli.command {
        Some(Command::Serve { port }) => port,
        None => None,
    };

    let config = config::config();
    tracing::info!("Starting lakeview-api in {:?} mode", config.environment);

    let state = build_state().await?;

    let mut app = handlers::router(state).layer(TraceLayer::new_for_http());
    if config.server.enable_cors {
        app = app.layer(CorsLayer::permissive());
    }

    let port = port_override.unwrap_or(config.server.port);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("lakeview-api listening on http://{}", bind_addr);

    axum::serve(listener, app).await.context("server")?;
    Ok(())
}

/// Postgres-backed state when DATABASE_URL is configured, in-memory
/// otherwise. The in-memory stores lose everything on restart.
async fn build_state() -> anyhow::Result<AppState> {
    let factory = Arc::new(DefaultIntegrationFactory);

    match &config::config().database.url {
        Some(url) => {
            let store = PgDocumentStore::connect(url)
                .await
                .context("connecting to the document store")?;
            let queue: Arc<dyn JobQueue> = Arc::new(
                PgJobQueue::new(store.pool().clone())
                    .await
                    .context("initializing the job queue")?,
            );
            Ok(AppState::new(store.stores(), queue, factory))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory stores");
            let store = MemoryStore::new();
            let queue: Arc<dyn JobQueue> = Arc::new(MemoryJobQueue::new());
            Ok(AppState::new(store.stores(), queue, factory))
        }
    }
}
