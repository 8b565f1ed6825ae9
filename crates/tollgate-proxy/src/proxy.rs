//! Forward proxy server.
//!
//! Accepts client connections (plain or TLS), serves HTTP/1.1 on each with
//! upgrades enabled for CONNECT, and dispatches every request to
//! [`ProxyHandler`].

use std::convert::Infallible;
use std::net::SocketAddr;
use std::num::NonZeroUsize;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;

use tollgate_core::{Blacklist, RequestLog, SharedCache, DEFAULT_CACHE_CAPACITY};

use crate::error::{ProxyError, Result};
use crate::handler::{HandlerConfig, ProxyHandler};
use crate::tls::TlsFiles;
use crate::DEFAULT_PROXY_PORT;

/// Proxy server configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Address to bind the proxy to.
    pub addr: SocketAddr,
    /// Maximum number of cached responses.
    pub cache_capacity: NonZeroUsize,
    /// Whether responses are cached at all.
    pub caching: bool,
    /// Serve the listener over TLS with these files.
    pub tls: Option<TlsFiles>,
    /// Shared blacklist (also replaced through the management API).
    pub blacklist: Blacklist,
    /// Shared request log (also read through the management API).
    pub request_log: RequestLog,
}

impl ProxyConfig {
    /// Creates a new configuration with default settings.
    pub fn new() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PROXY_PORT)),
            cache_capacity: NonZeroUsize::new(DEFAULT_CACHE_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
            caching: true,
            tls: None,
            blacklist: Blacklist::new(),
            request_log: RequestLog::new(),
        }
    }

    /// Sets the bind address.
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.addr.set_port(port);
        self
    }

    /// Sets the cache capacity.
    pub fn with_cache_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Disables response caching.
    pub fn without_caching(mut self) -> Self {
        self.caching = false;
        self
    }

    /// Serves the listener over TLS.
    pub fn with_tls(mut self, files: TlsFiles) -> Self {
        self.tls = Some(files);
        self
    }

    /// Uses a shared blacklist.
    pub fn with_blacklist(mut self, blacklist: Blacklist) -> Self {
        self.blacklist = blacklist;
        self
    }

    /// Uses a shared request log.
    pub fn with_request_log(mut self, request_log: RequestLog) -> Self {
        self.request_log = request_log;
        self
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// The proxy server.
pub struct ProxyServer {
    config: ProxyConfig,
    handler: ProxyHandler,
    tls: Option<TlsAcceptor>,
}

impl std::fmt::Debug for ProxyServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyServer")
            .field("config", &self.config)
            .field("handler", &self.handler)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

impl ProxyServer {
    /// Creates a new proxy server, loading TLS files if configured.
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let cache = config
            .caching
            .then(|| SharedCache::new(config.cache_capacity));
        let handler = ProxyHandler::new(HandlerConfig::new(
            cache,
            config.blacklist.clone(),
            config.request_log.clone(),
        )?);
        let tls = config.tls.as_ref().map(TlsFiles::acceptor).transpose()?;

        Ok(Self {
            config,
            handler,
            tls,
        })
    }

    /// Returns the configured bind address.
    pub fn addr(&self) -> SocketAddr {
        self.config.addr
    }

    /// Returns the request handler.
    pub fn handler(&self) -> &ProxyHandler {
        &self.handler
    }

    /// Starts the proxy server in the background.
    ///
    /// The listener is bound before returning, so port 0 resolves to the
    /// actual port in [`ProxyHandle::addr`].
    pub async fn start(self) -> Result<ProxyHandle> {
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        let listener = self.bind().await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(accept_loop(listener, self.handler, self.tls, shutdown_rx));

        Ok(ProxyHandle {
            shutdown_tx,
            addr,
            handle,
        })
    }

    async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.addr)
            .await
            .map_err(|e| ProxyError::Proxy(format!("Failed to bind {}: {}", self.config.addr, e)))?;
        let addr = listener.local_addr()?;

        tracing::info!(
            "Starting proxy on {} (tls: {}, caching: {})",
            addr,
            self.tls.is_some(),
            self.config.caching
        );
        Ok(listener)
    }
}

async fn accept_loop(
    listener: TcpListener,
    handler: ProxyHandler,
    tls: Option<TlsAcceptor>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                };

                let handler = handler.clone();
                let tls = tls.clone();
                tokio::spawn(async move {
                    match tls {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(stream) => serve_connection(stream, handler, peer).await,
                            Err(e) => tracing::debug!(%peer, "TLS handshake failed: {}", e),
                        },
                        None => serve_connection(stream, handler, peer).await,
                    }
                });
            }
            _ = shutdown_rx.recv() => {
                tracing::info!("Proxy shutdown signal received");
                break;
            }
        }
    }

    tracing::info!("Proxy server stopped");
}

async fn serve_connection<S>(stream: S, handler: ProxyHandler, peer: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req: Request<Incoming>| {
        let handler = handler.clone();
        async move { Ok::<_, Infallible>(handler.handle(req).await) }
    });

    if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades()
        .await
    {
        tracing::debug!(%peer, "Connection error: {}", e);
    }
}

/// Handle for controlling a running proxy server.
#[derive(Debug)]
pub struct ProxyHandle {
    shutdown_tx: broadcast::Sender<()>,
    addr: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl ProxyHandle {
    /// Returns the address the proxy is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signals the proxy to stop accepting connections.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Waits for the proxy to finish.
    pub async fn wait(self) {
        let _ = self.handle.await;
    }

    /// Shuts down the proxy and waits for it to finish.
    pub async fn stop(self) {
        self.shutdown();
        self.wait().await;
    }
}
