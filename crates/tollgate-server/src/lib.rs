//! Tollgate Server - management HTTP API.
//!
//! Runs on its own listener, separate from the proxy port.
//!
//! ## Endpoints
//!
//! - `GET /blacklist` - Current blacklist as `{"blacklist": [...]}`
//! - `POST /blacklist` - Replace the blacklist (persisted when a store is set)
//! - `GET /requests` - Request log entries
//! - `GET /dashboard/*` - Static dashboard files
//!
//! ## Example
//!
//! ```no_run
//! use tollgate_core::{Blacklist, RequestLog};
//! use tollgate_server::{AppState, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let state = AppState::new(Blacklist::new(), RequestLog::new());
//!     let server = Server::new(ServerConfig::default(), state).unwrap();
//!     server.run(std::future::pending()).await.unwrap();
//! }
//! ```

pub mod error;
mod handlers;
pub mod models;
pub mod state;

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;

use axum::routing::get;
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

pub use error::{ApiError, Result};
pub use state::{AppState, BLACKLIST_KEY};

/// Default server port.
pub const DEFAULT_PORT: u16 = 8889;

/// Default server host (localhost only for security).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default dashboard directory.
pub const DEFAULT_DASHBOARD_DIR: &str = "public";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1).
    pub host: String,
    /// Port to bind to (default: 8889).
    pub port: u16,
    /// Directory served under `/dashboard` (None = no dashboard).
    pub dashboard_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            dashboard_dir: Some(PathBuf::from(DEFAULT_DASHBOARD_DIR)),
        }
    }
}

impl ServerConfig {
    /// Sets the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the dashboard directory.
    pub fn with_dashboard_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.dashboard_dir = dir;
        self
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindError(SocketAddr, std::io::Error),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// Builds the API router.
pub fn router(state: AppState, dashboard_dir: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route(
            "/blacklist",
            get(handlers::get_blacklist).post(handlers::update_blacklist),
        )
        .route("/requests", get(handlers::get_requests));

    if let Some(dir) = dashboard_dir {
        router = router.nest_service("/dashboard", ServeDir::new(dir));
    }

    router.layer(cors).with_state(state)
}

/// The HTTP API server.
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Creates a server over shared application state.
    pub fn new(config: ServerConfig, state: AppState) -> std::result::Result<Self, ServerError> {
        let router = router(state, config.dashboard_dir);

        let ip: std::net::IpAddr = config
            .host
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {}", e)))?;

        Ok(Self {
            router,
            addr: SocketAddr::new(ip, config.port),
        })
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the server until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> std::result::Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting Tollgate API server on {}", self.addr);

        let listener = bind(self.addr)?;

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()))?;

        info!("API server stopped");
        Ok(())
    }
}

/// Binds with SO_REUSEADDR so restarts are not blocked by lingering sockets.
fn bind(addr: SocketAddr) -> std::result::Result<tokio::net::TcpListener, ServerError> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| ServerError::BindError(addr, e))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| ServerError::BindError(addr, e))?;
    socket
        .bind(&addr.into())
        .map_err(|e| ServerError::BindError(addr, e))?;
    socket
        .listen(128)
        .map_err(|e| ServerError::BindError(addr, e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| ServerError::BindError(addr, e))?;

    let std_listener: std::net::TcpListener = socket.into();
    tokio::net::TcpListener::from_std(std_listener).map_err(|e| ServerError::BindError(addr, e))
}
