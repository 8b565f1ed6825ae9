//! TLS for the proxy listener.
//!
//! Clients may reach the proxy itself over TLS. CONNECT payloads inside that
//! session are still relayed untouched.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tracing::info;

use crate::error::{ProxyError, Result};

/// Certificate chain and private key locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    /// PEM certificate chain.
    pub cert_path: PathBuf,
    /// PEM private key (PKCS#8, PKCS#1 or SEC1).
    pub key_path: PathBuf,
}

impl TlsFiles {
    /// Creates a new pair of paths.
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    /// Loads the files and builds an acceptor.
    pub fn acceptor(&self) -> Result<TlsAcceptor> {
        info!("Loading TLS certificate from: {:?}", self.cert_path);
        let certs = load_certs(&self.cert_path)?;

        info!("Loading TLS private key from: {:?}", self.key_path);
        let key = load_key(&self.key_path)?;

        let config = ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| ProxyError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ProxyError::Tls(e.to_string()))?;

        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| ProxyError::Tls(format!("Failed to open {:?}: {}", path, e)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ProxyError::Tls(format!("Failed to parse certificates: {}", e)))?;

    if certs.is_empty() {
        return Err(ProxyError::Tls(format!("No certificates found in {:?}", path)));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ProxyError::Tls(format!("Failed to parse private key: {}", e)))?
        .ok_or_else(|| ProxyError::Tls(format!("No private key found in {:?}", path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn acceptor_error(files: &TlsFiles) -> ProxyError {
        match files.acceptor() {
            Err(e) => e,
            Ok(_) => panic!("expected a TLS error"),
        }
    }

    #[test]
    fn missing_files_are_tls_errors() {
        let dir = TempDir::new().unwrap();
        let files = TlsFiles::new(dir.path().join("cert.pem"), dir.path().join("key.pem"));

        let err = acceptor_error(&files);
        assert!(matches!(err, ProxyError::Tls(_)));
        assert!(err.to_string().contains("cert.pem"));
    }

    #[test]
    fn empty_certificate_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, "").unwrap();
        std::fs::write(&key, "").unwrap();

        let err = acceptor_error(&TlsFiles::new(&cert, &key));
        assert!(err.to_string().contains("No certificates"));
    }

    #[test]
    fn missing_key_is_rejected() {
        let dir = TempDir::new().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        // A syntactically valid PEM block; the key file has none.
        std::fs::write(
            &cert,
            "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n",
        )
        .unwrap();
        std::fs::write(&key, "not a key\n").unwrap();

        let err = acceptor_error(&TlsFiles::new(&cert, &key));
        assert!(err.to_string().contains("No private key"));
    }
}
