//! TLS acceptor setup.
//!
//! The relay requires mutual authentication: it presents its own
//! certificate chain and verifies client certificates against the trusted
//! roots in the CA file. The rest of the server only ever sees an opaque
//! encrypted duplex stream.

use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{RootCertStore, ServerConfig};
use tokio_rustls::TlsAcceptor;
use tracing::info;

use crate::error::ServerError;

/// Build a TLS acceptor from PEM files: server cert chain, private key, and
/// the trust roots used to verify client certificates.
pub fn build_acceptor(cert: &Path, key: &Path, ca: &Path) -> Result<TlsAcceptor, ServerError> {
    let certs = load_certs(cert)?;
    let key = load_key(key)?;
    let roots = load_roots(ca)?;

    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| ServerError::TlsConfig(e.to_string()))?;

    let config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::TlsConfig(e.to_string()))?;

    info!(cert = %cert.display(), ca = %ca.display(), "TLS acceptor ready");
    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let pem = std::fs::read(path)?;
    let certs = rustls_pemfile::certs(&mut &pem[..]).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(ServerError::TlsConfig(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ServerError> {
    let pem = std::fs::read(path)?;
    rustls_pemfile::private_key(&mut &pem[..])?.ok_or_else(|| {
        ServerError::TlsConfig(format!("no private key found in {}", path.display()))
    })
}

fn load_roots(path: &Path) -> Result<RootCertStore, ServerError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots
            .add(cert)
            .map_err(|e| ServerError::TlsConfig(e.to_string()))?;
    }
    Ok(roots)
}
