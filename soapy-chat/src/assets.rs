//! Plain HTTP server for the browser chat page. It shares nothing with the
//! relay beyond the process and the relay's port, which the page reads from
//! `/config.json` before opening its WebSocket.

use std::{future::Future, path::Path};

use anyhow::{Context, Result};
use axum::{Json, Router, routing::get};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageConfig {
    pub ws_port: u16,
}

pub fn router(dir: impl AsRef<Path>, ws_port: u16) -> Router {
    let config = PageConfig { ws_port };
    Router::new()
        .route("/config.json", get(move || async move { Json(config) }))
        .fallback_service(ServeDir::new(dir))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve<F>(
    listener: TcpListener,
    dir: impl AsRef<Path>,
    ws_port: u16,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(dir, ws_port))
        .with_graceful_shutdown(shutdown)
        .await
        .context("static page server failed")
}
