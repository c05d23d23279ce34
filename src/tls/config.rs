//! Client/server TLS configuration and handshake entry points.

use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore, ServerConfig, ServerConnection};

use super::stream::TlsStream;
use crate::error::{Error, Result};
use crate::io::ByteStream;
use crate::net::TcpStream;
use crate::reactor::Poller;

/// Client-side TLS configuration.
#[derive(Debug, Clone)]
pub struct TlsConnector {
    config: Arc<ClientConfig>,
}

impl TlsConnector {
    /// Wraps a prepared rustls config.
    #[must_use]
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self { config }
    }

    /// A connector trusting the given PEM root certificates.
    pub fn with_root_certs(pem: &[u8]) -> Result<Self> {
        let mut roots = RootCertStore::empty();
        for cert in certs_from_pem(pem)? {
            roots
                .add(cert)
                .map_err(|e| Error::Tls(e.to_string()))?;
        }
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Self::new(Arc::new(config)))
    }

    /// A connector that skips server certificate verification.
    ///
    /// For talking to self-signed peers in controlled environments only.
    #[must_use]
    pub fn insecure() -> Self {
        let config = ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SkipServerVerification))
            .with_no_client_auth();
        Self::new(Arc::new(config))
    }

    /// Connects a TCP socket to `addr` and drives the client handshake.
    pub async fn connect<P: Poller>(
        &self,
        poller: &Rc<P>,
        addr: SocketAddr,
        server_name: &str,
    ) -> Result<TlsStream<TcpStream<P>>> {
        let tcp = TcpStream::connect(poller, addr).await?;
        self.handshake(server_name, tcp).await
    }

    /// Drives the client handshake over an established stream.
    pub async fn handshake<S: ByteStream>(
        &self,
        server_name: &str,
        stream: S,
    ) -> Result<TlsStream<S>> {
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|_| Error::Tls(format!("invalid server name {server_name:?}")))?;
        let conn = ClientConnection::new(Arc::clone(&self.config), name)
            .map_err(|e| Error::Tls(e.to_string()))?;
        let mut tls = TlsStream::new(stream, conn.into());
        tls.complete_handshake().await?;
        Ok(tls)
    }
}

/// Server-side TLS configuration.
#[derive(Debug, Clone)]
pub struct TlsAcceptor {
    config: Arc<ServerConfig>,
}

impl TlsAcceptor {
    /// Wraps a prepared rustls config.
    #[must_use]
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }

    /// An acceptor serving the PEM certificate chain and private key.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let certs = certs_from_pem(cert_pem)?;
        let key = key_from_pem(key_pem)?;
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| Error::Tls(e.to_string()))?;
        Ok(Self::new(Arc::new(config)))
    }

    /// Drives the server handshake over an accepted stream.
    pub async fn accept_handshake<S: ByteStream>(&self, stream: S) -> Result<TlsStream<S>> {
        let conn = ServerConnection::new(Arc::clone(&self.config))
            .map_err(|e| Error::Tls(e.to_string()))?;
        let mut tls = TlsStream::new(stream, conn.into());
        tls.complete_handshake().await?;
        Ok(tls)
    }
}

fn certs_from_pem(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let certs: Vec<_> = rustls_pemfile::certs(&mut &pem[..])
        .collect::<std::io::Result<_>>()
        .map_err(|e| Error::Tls(format!("bad certificate pem: {e}")))?;
    if certs.is_empty() {
        return Err(Error::Tls("no certificates in pem".into()));
    }
    Ok(certs)
}

fn key_from_pem(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| Error::Tls(format!("bad key pem: {e}")))?
        .ok_or_else(|| Error::Tls("no private key in pem".into()))
}

/// Accept-everything certificate verifier backing
/// [`TlsConnector::insecure`].
#[derive(Debug)]
struct SkipServerVerification;

impl rustls::client::danger::ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
