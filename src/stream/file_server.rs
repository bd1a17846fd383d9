//! HTTP server exposing downloaded caption files
//!
//! Cast receivers and browser players fetch captions over HTTP, so the
//! subtitle directory is served read-only on the LAN address.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

/// Serves files from one directory until shut down
pub struct SubtitleServer {
    addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SubtitleServer {
    /// Bind on all interfaces; port 0 picks a free port
    pub async fn bind(dir: PathBuf, port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("Failed to bind subtitle server on port {}", port))?;
        let addr = listener.local_addr()?;
        info!(%addr, dir = %dir.display(), "subtitle server listening");

        let app = Router::new()
            .route("/{name}", get(caption_handler))
            .layer(CorsLayer::permissive())
            .with_state(Arc::new(dir));

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(e) = served {
                error!(error = %e, "subtitle server failed");
            }
        });

        Ok(Self { addr, cancel, task })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

async fn caption_handler(
    State(dir): State<Arc<PathBuf>>,
    UrlPath(name): UrlPath<String>,
) -> Response {
    let Some(path) = resolve(&dir, &name) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match tokio::fs::read(&path).await {
        Ok(body) => ([(header::CONTENT_TYPE, "text/vtt; charset=utf-8")], body).into_response(),
        Err(e) => {
            debug!(file = name.as_str(), error = %e, "caption not served");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Map a decoded file name to a file directly inside `dir`
fn resolve(dir: &Path, name: &str) -> Option<PathBuf> {
    let valid = !name.is_empty()
        && !name.contains('/')
        && !name.contains('\\')
        && !name.starts_with('.');
    valid.then(|| dir.join(name))
}
