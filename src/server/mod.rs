//! HTTP front end: control API, viewer WebSocket and the viewer page.
//!
//! ```text
//! GET  /                          viewer page
//! GET  /ws                        push channel (one hub session per socket)
//! POST /api/watch                 register {path, active?}
//! DELETE /api/watch?path=         remove
//! DELETE /api/remove?path=        remove
//! GET  /api/files                 snapshot
//! POST /api/files/activate?path=
//! POST /api/files/deactivate?path=
//! POST /api/files/remove-deleted
//! GET  /api/logs
//! POST /api/shutdown
//! ```

pub mod api;
mod ws;

use std::io;
use std::net::SocketAddr;

use axum::Router;
use axum::response::Html;
use axum::routing::{delete, get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::hub::FileRegistry;

pub use api::ApiError;

const VIEWER_PAGE: &str = include_str!("../../static/index.html");

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: FileRegistry,
    pub shutdown: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(viewer_page))
        .route("/ws", get(ws::upgrade))
        .route("/api/watch", post(api::watch).delete(api::remove))
        .route("/api/remove", delete(api::remove))
        .route("/api/files", get(api::files))
        .route("/api/files/activate", post(api::activate))
        .route("/api/files/deactivate", post(api::deactivate))
        .route("/api/files/remove-deleted", post(api::remove_deleted))
        .route("/api/logs", get(api::logs))
        .route("/api/shutdown", post(api::shutdown))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn viewer_page() -> Html<&'static str> {
    Html(VIEWER_PAGE)
}

/// Bind `host:port`, or the next free port within `scan` of it, or finally
/// any port the OS hands out.
pub async fn bind_with_fallback(host: &str, port: u16, scan: u16) -> io::Result<TcpListener> {
    match TcpListener::bind((host, port)).await {
        Ok(listener) => return Ok(listener),
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
            crate::debug_event!("server", "port busy", "{port}");
        }
        Err(e) => return Err(e),
    }

    for candidate in (1..=scan).filter_map(|offset| port.checked_add(offset)) {
        if let Ok(listener) = TcpListener::bind((host, candidate)).await {
            return Ok(listener);
        }
    }

    TcpListener::bind((host, 0)).await
}

/// A bound server, ready to run.
pub struct Server {
    listener: TcpListener,
    state: AppState,
}

impl Server {
    /// Bind according to `config`, preferring `port`.
    pub async fn bind(
        config: &ServerConfig,
        port: u16,
        registry: FileRegistry,
    ) -> io::Result<Self> {
        let listener = bind_with_fallback(&config.host, port, config.port_scan).await?;
        Ok(Self::from_listener(listener, registry))
    }

    pub fn from_listener(listener: TcpListener, registry: FileRegistry) -> Self {
        Self {
            listener,
            state: AppState {
                registry,
                shutdown: CancellationToken::new(),
            },
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Cancelling this token stops the server. `/api/shutdown` cancels it too.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Serve until the shutdown token is cancelled. All watches and viewer
    /// sessions are closed before this returns.
    pub async fn run(self) -> io::Result<()> {
        let Server { listener, state } = self;
        let addr = listener.local_addr()?;
        let registry = state.registry.clone();
        let shutdown = state.shutdown.clone();

        // Sessions must close before graceful shutdown can finish.
        let closer = {
            let registry = registry.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                shutdown.cancelled().await;
                registry.shutdown();
            })
        };

        crate::log_event!("server", "listening", "http://{addr}");
        registry
            .activity()
            .info(format!("Server started on port {}", addr.port()));

        let result = axum::serve(listener, router(state))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;

        // Also covers the server ending on its own
        registry.shutdown();
        closer.abort();
        crate::log_event!("server", "stopped");
        result
    }
}
