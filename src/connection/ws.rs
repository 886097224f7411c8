//! WebSocket transport built on `tokio-tungstenite`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::SinkExt;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::{self, Message, Utf8Bytes};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config};
use tracing::debug;
use url::Url;

use crate::error::{ConnectError, WriteError};

use super::config::{ConnectionConfig, TlsConfig};
use super::transport::{CloseCode, Link, Transport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket connections, with TLS when configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl WsTransport {
    /// Create a WebSocket transport.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    type Link = WsLink;

    async fn open(&self, endpoint: &Url, config: &ConnectionConfig) -> Result<WsLink, ConnectError> {
        let mut request = endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| ConnectError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        if let Some(protocol) = &config.subprotocol {
            let value = HeaderValue::from_str(protocol).map_err(|e| ConnectError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: format!("bad subprotocol '{protocol}': {e}"),
            })?;
            request.headers_mut().insert("Sec-WebSocket-Protocol", value);
        }

        let connector = config
            .tls
            .as_ref()
            .map(|tls| client_config(tls).map(|c| Connector::Rustls(Arc::new(c))))
            .transpose()?;

        let (stream, response) = connect_async_tls_with_config(request, None, true, connector)
            .await
            .map_err(|e| connect_error(endpoint, e))?;

        debug!(status = %response.status(), "WebSocket handshake complete");
        Ok(WsLink { stream })
    }
}

/// A live WebSocket connection.
pub struct WsLink {
    stream: WsStream,
}

#[async_trait]
impl Link for WsLink {
    async fn send_frame(&mut self, payload: Bytes) -> Result<(), WriteError> {
        self.stream
            .send(Message::Binary(payload))
            .await
            .map_err(write_error)
    }

    async fn close(&mut self, code: CloseCode) -> Result<(), WriteError> {
        let frame = CloseFrame {
            code: WsCloseCode::from(code.as_u16()),
            reason: Utf8Bytes::from_static(""),
        };
        match self.stream.close(Some(frame)).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(write_error(e)),
        }
    }
}

impl std::fmt::Debug for WsLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsLink").finish()
    }
}

fn connect_error(endpoint: &Url, err: tungstenite::Error) -> ConnectError {
    match err {
        tungstenite::Error::Io(e) => ConnectError::Io(e),
        tungstenite::Error::Tls(e) => ConnectError::Tls(e.to_string()),
        tungstenite::Error::Url(e) => ConnectError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        },
        other => ConnectError::handshake(endpoint.as_str(), other),
    }
}

fn write_error(err: tungstenite::Error) -> WriteError {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            WriteError::ConnectionClosed
        }
        other => WriteError::Transport(other.to_string()),
    }
}

/// Build the rustls client configuration for a secure endpoint.
fn client_config(tls: &TlsConfig) -> Result<ClientConfig, ConnectError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| ConnectError::Tls(e.to_string()))?;

    if !tls.verify_peer {
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
            .with_no_client_auth());
    }

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    if let Some(path) = &tls.ca_file {
        let certs = CertificateDer::pem_file_iter(path)
            .map_err(|e| ConnectError::Tls(format!("cannot read {}: {e}", path.display())))?;
        for cert in certs {
            let cert = cert.map_err(|e| ConnectError::Tls(format!("bad certificate in {}: {e}", path.display())))?;
            roots
                .add(cert)
                .map_err(|e| ConnectError::Tls(e.to_string()))?;
        }
    }

    Ok(builder.with_root_certificates(roots).with_no_client_auth())
}

/// Accepts any server certificate but still checks handshake signatures.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
