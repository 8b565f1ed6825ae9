//! Command-line arguments.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Parser;
use tollgate_proxy::{TlsFiles, DEFAULT_PROXY_PORT};
use tollgate_server::{DEFAULT_DASHBOARD_DIR, DEFAULT_HOST, DEFAULT_PORT};

/// Tollgate - caching forward proxy with host blacklisting
#[derive(Parser, Debug, Clone)]
#[command(name = "tollgate", version, about)]
pub struct Args {
    /// Address to bind the proxy and API listeners to
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: IpAddr,

    /// Proxy port
    #[arg(long, default_value_t = DEFAULT_PROXY_PORT)]
    pub port: u16,

    /// Management API port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub api_port: u16,

    /// Maximum number of cached responses
    #[arg(long, default_value = "1024")]
    pub cache_capacity: NonZeroUsize,

    /// Forward every request without caching
    #[arg(long)]
    pub no_cache: bool,

    /// PEM certificate chain; serves the proxy listener over TLS
    #[arg(long, requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key for --tls-cert
    #[arg(long, requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// Directory served under /dashboard
    #[arg(long, default_value = DEFAULT_DASHBOARD_DIR)]
    pub dashboard_dir: PathBuf,

    /// Config store path (default: platform data directory)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Block hosts containing this substring (repeatable); ignored when the
    /// store already holds a blacklist
    #[arg(long = "block", value_name = "PATTERN")]
    pub block: Vec<String>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Proxy listener address.
    pub fn proxy_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// TLS files, when both were given.
    pub fn tls_files(&self) -> Option<TlsFiles> {
        match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) => Some(TlsFiles::new(cert, key)),
            _ => None,
        }
    }
}
