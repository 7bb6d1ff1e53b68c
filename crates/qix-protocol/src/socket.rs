// Copyright (C) 2025 The qix-tools authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! WebSocket channel to a QIX engine.
//!
//! Local engines (Desktop) take a plain `ws://` connection. Server engines
//! take `wss://` with mutual TLS (client certificate + key against the
//! site's root CA) and an `X-Qlik-User` header naming the impersonated
//! user. Either way the engine scopes the connection to one app via the
//! endpoint path, so every opened app gets its own socket.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{
    Connector, MaybeTlsStream, WebSocketStream, connect_async, connect_async_tls_with_config,
};
use tracing::debug;

/// Header naming the user a server connection acts as.
pub const USER_HEADER: &str = "X-Qlik-User";

/// Errors that can occur on the engine socket.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("cannot read {}: {}", .path.display(), .source)]
    CertRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {}", .0.display())]
    NoCertificates(PathBuf),

    #[error("no private key found in {}", .0.display())]
    NoPrivateKey(PathBuf),

    #[error("user header value not accepted: {0}")]
    InvalidUserHeader(String),

    #[error("connection closed by engine")]
    Closed,
}

/// Mutual-TLS material for a server engine.
///
/// The certificate directory layout is the one the Sense site exports:
/// `client.pem`, `client_key.pem` and the `root.pem` CA bundle.
#[derive(Debug, Clone)]
pub struct TlsIdentity {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    pub ca_file: PathBuf,
    /// Skip server certificate verification (for development only!)
    pub dangerous_skip_verification: bool,
}

impl TlsIdentity {
    /// Point at an exported certificate directory.
    pub fn from_dir(dir: &Path) -> Self {
        Self {
            cert_file: dir.join("client.pem"),
            key_file: dir.join("client_key.pem"),
            ca_file: dir.join("root.pem"),
            dangerous_skip_verification: false,
        }
    }
}

/// Identity asserted via the `X-Qlik-User` header.
#[derive(Debug, Clone)]
pub struct UserHeader {
    pub directory: String,
    pub user_id: String,
}

impl UserHeader {
    pub fn new(directory: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            user_id: user_id.into(),
        }
    }

    /// Render the header value the engine expects.
    pub fn value(&self) -> String {
        format!("UserDirectory={}; UserId={}", self.directory, self.user_id)
    }
}

// Escape set matching what the engine accepts in the app path segment:
// alphanumerics plus `_ . - ~` and `/` pass through.
const APP_ID_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// Build the endpoint for one app by appending its percent-encoded id to
/// the base URI. Without an app id the endpoint addresses the engine-global
/// scope only.
pub fn app_endpoint(base: &str, app_id: Option<&str>) -> String {
    match app_id {
        Some(id) => format!("{}{}", base, utf8_percent_encode(id, APP_ID_ESCAPES)),
        None => base.to_string(),
    }
}

/// Build the rustls client configuration for mutual TLS.
pub fn build_client_tls(identity: &TlsIdentity) -> Result<Arc<rustls::ClientConfig>, SocketError> {
    let certs = load_certs(&identity.cert_file)?;
    let key = load_private_key(&identity.key_file)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?;

    let config = if identity.dangerous_skip_verification {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SkipServerVerification))
            .with_client_auth_cert(certs, key)?
    } else {
        let mut roots = rustls::RootCertStore::empty();
        for cert in load_certs(&identity.ca_file)? {
            roots.add(cert)?;
        }
        builder
            .with_root_certificates(roots)
            .with_client_auth_cert(certs, key)?
    };

    Ok(Arc::new(config))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, SocketError> {
    let file = File::open(path).map_err(|source| SocketError::CertRead {
        path: path.to_path_buf(),
        source,
    })?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| SocketError::CertRead {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(SocketError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, SocketError> {
    let file = File::open(path).map_err(|source| SocketError::CertRead {
        path: path.to_path_buf(),
        source,
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|source| SocketError::CertRead {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| SocketError::NoPrivateKey(path.to_path_buf()))
}

/// A live channel to one engine session.
pub struct EngineSocket {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl EngineSocket {
    /// Open the channel. `tls` selects mutual TLS (server engines);
    /// `user` attaches the impersonation header.
    ///
    /// Connection failures here are final; the caller decides whether the
    /// surrounding operation survives them.
    pub async fn connect(
        endpoint: &str,
        tls: Option<&TlsIdentity>,
        user: Option<&UserHeader>,
    ) -> Result<Self, SocketError> {
        let mut request = endpoint.into_client_request()?;
        if let Some(user) = user {
            let value = HeaderValue::from_str(&user.value())
                .map_err(|_| SocketError::InvalidUserHeader(user.value()))?;
            request.headers_mut().insert(USER_HEADER, value);
        }

        debug!(endpoint, "opening websocket");
        let (ws, response) = match tls {
            Some(identity) => {
                let config = build_client_tls(identity)?;
                connect_async_tls_with_config(request, None, false, Some(Connector::Rustls(config)))
                    .await?
            }
            None => connect_async(request).await?,
        };
        debug!(status = %response.status(), "websocket established");

        Ok(Self { ws })
    }

    /// Send one text frame.
    pub async fn send(&mut self, text: String) -> Result<(), SocketError> {
        self.ws.send(Message::Text(text)).await?;
        Ok(())
    }

    /// Receive the next text frame. Control frames are handled in place;
    /// binary frames are not part of the protocol and are skipped.
    pub async fn recv(&mut self) -> Result<String, SocketError> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(payload))) => {
                    debug!(len = payload.len(), "skipping binary frame");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) | None => return Err(SocketError::Closed),
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Close the channel (best effort).
    pub async fn close(mut self) {
        if let Err(e) = self.ws.close(None).await
            && !matches!(e, WsError::ConnectionClosed | WsError::AlreadyClosed)
        {
            debug!(error = %e, "websocket close failed");
        }
    }
}

/// Certificate verifier that skips all verification (for development only!)
#[derive(Debug)]
struct SkipServerVerification;

impl rustls::client::danger::ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
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
