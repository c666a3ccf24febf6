//! Byte transport for SMTP probes: plain streams with an in-place TLS upgrade.

use crate::core::error::{AppError, Result};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::io;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::rustls::client::{ServerCertVerified, ServerCertVerifier};
use tokio_rustls::rustls::{self, Certificate, ClientConfig, ServerName};
use tokio_rustls::TlsConnector;

/// Opens byte streams to mail servers.
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn connect(&self, host: &str, port: u16) -> io::Result<Self::Stream>;
}

/// Connects over plain TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// Accepts any certificate: STARTTLS here only encrypts a throwaway probe,
/// it does not authenticate the server.
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

static TLS_CONNECTOR: Lazy<TlsConnector> = Lazy::new(|| {
    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
});

/// The stream a session talks over. Upgraded in place on STARTTLS.
pub(crate) enum Transport<S> {
    Plain(S),
    Tls(Box<tokio_rustls::client::TlsStream<S>>),
    Closed,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub(crate) fn is_tls(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }

    pub(crate) async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Transport::Plain(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
            Transport::Tls(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
            Transport::Closed => return Err(AppError::ConnectionClosed),
        }
        Ok(())
    }

    pub(crate) async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Transport::Plain(stream) => stream.read(buf).await?,
            Transport::Tls(stream) => stream.read(buf).await?,
            Transport::Closed => return Err(AppError::ConnectionClosed),
        };
        if n == 0 {
            return Err(AppError::ConnectionClosed);
        }
        Ok(n)
    }

    /// Wraps the current plain stream in TLS. On failure the connection is
    /// gone and the transport is left `Closed`.
    pub(crate) async fn upgrade(&mut self, host: &str) -> Result<()> {
        let plain = match std::mem::replace(self, Transport::Closed) {
            Transport::Plain(stream) => stream,
            Transport::Tls(stream) => {
                *self = Transport::Tls(stream);
                return Err(AppError::SmtpTls("Connection is already TLS".to_string()));
            }
            Transport::Closed => return Err(AppError::ConnectionClosed),
        };

        let server_name = ServerName::try_from(host.trim_end_matches('.'))
            .map_err(|e| AppError::SmtpTls(format!("Invalid server name '{}': {}", host, e)))?;
        let tls = TLS_CONNECTOR
            .connect(server_name, plain)
            .await
            .map_err(|e| AppError::SmtpTls(format!("Handshake with {} failed: {}", host, e)))?;

        *self = Transport::Tls(Box::new(tls));
        Ok(())
    }

    pub(crate) async fn shutdown(&mut self) {
        let result = match self {
            Transport::Plain(stream) => stream.shutdown().await,
            Transport::Tls(stream) => stream.shutdown().await,
            Transport::Closed => Ok(()),
        };
        if let Err(e) = result {
            tracing::trace!(target: "smtp_task", "Ignoring shutdown error: {}", e);
        }
        *self = Transport::Closed;
    }
}
