//! Error types for the proxy.

use hyper::StatusCode;
use thiserror::Error;
use tollgate_core::CoreError;

/// Proxy error type.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS configuration error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The request target is not usable by a forward proxy.
    #[error("Invalid request target: {0}")]
    InvalidTarget(String),

    /// The client request body could not be read.
    #[error("Request body error: {0}")]
    Body(String),

    /// Dialing a CONNECT target failed.
    #[error("Failed to connect to {target}: {source}")]
    Dial {
        /// The `host:port` that was dialed.
        target: String,
        /// The underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// The origin could not be reached or its response could not be read.
    #[error("Origin error: {0}")]
    Origin(#[from] reqwest::Error),

    /// Freshness evaluation failed.
    #[error("Cache error: {0}")]
    Cache(#[from] CoreError),

    /// The client connection cannot be taken over for tunneling.
    #[error("Connection cannot be upgraded for tunneling")]
    Hijack,

    /// Proxy server error.
    #[error("Proxy error: {0}")]
    Proxy(String),
}

impl ProxyError {
    /// HTTP status reported to the client for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidTarget(_) | ProxyError::Body(_) => StatusCode::BAD_REQUEST,
            ProxyError::Dial { .. } | ProxyError::Origin(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Cache(e) if e.is_parse() => StatusCode::BAD_GATEWAY,
            ProxyError::Cache(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Io(_)
            | ProxyError::Tls(_)
            | ProxyError::Hijack
            | ProxyError::Proxy(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_map_to_bad_gateway() {
        let err = ProxyError::from(CoreError::InvalidMaxAge("abc".into()));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn dial_errors_map_to_service_unavailable() {
        let err = ProxyError::Dial {
            target: "example.com:443".into(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.to_string().contains("example.com:443"));
    }

    #[test]
    fn hijack_maps_to_internal_error() {
        assert_eq!(
            ProxyError::Hijack.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn invalid_target_maps_to_bad_request() {
        let err = ProxyError::InvalidTarget("/relative".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
