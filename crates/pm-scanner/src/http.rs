//! Minimal read-only HTTP surface for the Scanner's last tick, grounded on
//! the teacher's `hip3-dashboard::server` (`Router::new().route(...)`
//! wired to shared state via `with_state`, served off a plain
//! `TcpListener`). Deliberately smaller than that dashboard: one route,
//! no auth, no WebSocket push, since the scanner only needs to publish a
//! score snapshot, not a live console.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::{Scanner, ScannerSnapshot};

async fn status(State(scanner): State<Arc<Scanner>>) -> Json<ScannerSnapshot> {
    Json(scanner.last_snapshot())
}

pub fn router(scanner: Arc<Scanner>) -> Router {
    Router::new().route("/scanner/status", get(status)).with_state(scanner)
}

/// Binds and serves the status router until the process exits; intended
/// to run in its own `tokio::spawn`ed task alongside the Trade Loop.
pub async fn serve(scanner: Arc<Scanner>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "scanner status endpoint listening");
    axum::serve(listener, router(scanner)).await
}
