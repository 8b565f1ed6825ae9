//! Tollgate Proxy - caching forward proxy.
//!
//! This crate provides the proxy listener and the per-request dispatcher:
//!
//! - CONNECT requests are tunneled byte-for-byte to the target (no TLS
//!   interception)
//! - Other requests are checked against the blacklist, served from the
//!   response cache when fresh, or forwarded to the origin and cached when
//!   the response allows it
//! - Every request is recorded in the request log
//!
//! ## Architecture
//!
//! ```text
//! Client Request → Request Log → Blacklist? ──yes──▶ 403
//!                                   │ no
//!                    ┌──────────────┴──────────────┐
//!                    │ CONNECT                     │ other
//!                    ▼                             ▼
//!              Dial + Tunnel              Cache lookup (GET/HEAD)
//!                                                  │
//!                                    ┌─────────────┴─────────────┐
//!                                    │ fresh                     │ miss / stale
//!                                    ▼                           ▼
//!                              Cached response          Forward → Relay → Maybe cache
//! ```

mod error;
mod handler;
mod headers;
mod proxy;
mod tls;
pub mod tunnel;

pub use error::{ProxyError, Result};
pub use handler::{origin_client, HandlerConfig, ProxyHandler};
pub use headers::{forward_request_headers, strip_hop_headers};
pub use proxy::{ProxyConfig, ProxyHandle, ProxyServer};
pub use tls::TlsFiles;

/// Default proxy port.
pub const DEFAULT_PROXY_PORT: u16 = 8888;
