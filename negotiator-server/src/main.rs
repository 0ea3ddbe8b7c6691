//! Negotiation server - streams proposer/reviewer negotiations over SSE.

mod routes;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use negotiator::agents::canned::canned_responder;
use negotiator::io::config::{NegotiatorConfig, PersistenceBackend, load_config, write_config};
use negotiator::io::persistence::{InMemoryGateway, JsonlGateway, PersistenceGateway};
use negotiator::session::SessionBoundary;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "negotiator-server")]
#[command(about = "Streams bounded proposer/reviewer negotiations over SSE")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3001")]
    port: u16,

    /// Config file (TOML); defaults apply when it does not exist
    #[arg(long, default_value = ".negotiator/config.toml")]
    config: PathBuf,

    /// Override the configured round budget
    #[arg(long)]
    max_rounds: Option<u32>,

    /// Write the effective config to --config and exit
    #[arg(long)]
    write_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    negotiator::logging::init("negotiator=info,negotiator_server=info");

    let args = Args::parse();

    let mut config = load_config(&args.config)?;
    if let Some(max_rounds) = args.max_rounds {
        config.max_rounds = max_rounds;
        config.validate()?;
    }
    if args.write_config {
        write_config(&args.config, &config)?;
        info!(path = %args.config.display(), "wrote config");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let boundary = build_boundary(&config)?.with_shutdown(shutdown.clone());
    let state = AppState::new(boundary);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api", routes::api_router())
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.bind, args.port))?;
    info!(addr = %addr, max_rounds = config.max_rounds, "listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

fn build_boundary(config: &NegotiatorConfig) -> Result<SessionBoundary> {
    let gateway: Arc<dyn PersistenceGateway> = match config.persistence.backend {
        PersistenceBackend::Jsonl => {
            info!(dir = %config.persistence.dir.display(), "persisting records as JSONL");
            Arc::new(JsonlGateway::new(&config.persistence.dir))
        }
        PersistenceBackend::Memory => {
            info!("persisting records in memory");
            Arc::new(InMemoryGateway::new())
        }
    };
    let responder = Arc::new(canned_responder(&config.responder));
    Ok(SessionBoundary::new(
        responder,
        gateway,
        config.round_budget()?,
    ))
}

/// Resolve on ctrl-c, cancelling every in-flight negotiation first.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
    shutdown.cancel();
}
