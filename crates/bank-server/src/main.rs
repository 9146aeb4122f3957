//! Bank Memory Engine Server
//!
//! Thin HTTP/SSE adapter: chat transport, agent control, and the durable
//! event stream described in the external-interfaces design. All memory
//! semantics (retain, recall, consolidation, entity resolution) live in
//! `bank-core`; this binary only wires storage, owns the process-level
//! logging setup, and exposes the collaborator surface over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use bank_core::Storage;
use bank_server::agent::{AgentManager, StubAgent};
use bank_server::event_stream::EventStream;
use bank_server::routes::router;
use bank_server::state::AppState;
use axum::http::HeaderValue;
use clap::Parser;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Maximum number of requests the server processes concurrently before
/// backpressure kicks in.
const MAX_CONCURRENT_REQUESTS: usize = 256;

#[derive(Parser, Debug)]
#[command(name = "bank-server", version, about = "HTTP/SSE adapter for the bank memory engine")]
struct Args {
    /// Directory holding the SQLite database. Defaults to the platform
    /// data directory for com.bank.memory (resolved by `Storage::new`).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 3100)]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_target(false)
        .init();

    let args = Args::parse();

    info!(data_dir = ?args.data_dir, "bank-server starting");

    let storage = match Storage::new(args.data_dir) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(error = %e, "failed to initialize storage");
            std::process::exit(1);
        }
    };
    let events = Arc::new(EventStream::new());
    let agents = Arc::new(AgentManager::new(Arc::new(StubAgent), events.clone(), storage));
    let state = AppState::new(events, agents);

    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(SetResponseHeaderLayer::if_not_present(
            axum::http::header::SERVER,
            HeaderValue::from_static("bank-server"),
        ))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS));

    let addr: SocketAddr = match format!("{}:{}", args.host, args.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, "invalid host/port");
            std::process::exit(1);
        }
    };

    info!(%addr, "listening");
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }

    info!("bank-server shutting down");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
