//! SMTP probing: reply framing, transport, and the probe session.

pub(crate) mod client;
pub(crate) mod response;
pub(crate) mod result;
pub(crate) mod transport;

pub use client::{probe_once, SessionState, SmtpSession};
pub use response::{Reply, ReplyParser};
pub use result::SmtpOutcome;
pub use transport::{Connector, TcpConnector};

use crate::core::error::{AppError, Result};
use std::time::Duration;

/// Tests basic SMTP connectivity to a known reliable server (Google).
/// This helps diagnose if outbound port 25 is generally blocked.
pub async fn test_smtp_connectivity() -> Result<()> {
    tracing::info!("Testing outbound SMTP (port 25) connectivity to Google...");

    let test_server = "gmail-smtp-in.l.google.com";
    let timeout = Duration::from_secs(5);

    let stream = match tokio::time::timeout(timeout, TcpConnector.connect(test_server, 25)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::error!(
                "SMTP connectivity test failed: Error connecting to {}: {}",
                test_server,
                e
            );
            return Err(AppError::Io(e));
        }
        Err(_) => {
            tracing::error!(
                "SMTP connectivity test timed out connecting to {}. Outbound port 25 is likely blocked by ISP, firewall, or network provider.",
                test_server
            );
            return Err(AppError::SmtpTimeout(
                "SMTP connection timed out - port 25 is likely blocked.".to_string(),
            ));
        }
    };

    let mut session = SmtpSession::new(stream, test_server, timeout);
    let greeting = session.greet().await;
    session.close().await;
    greeting?;

    tracing::info!(
        "SMTP connectivity test successful (connected to {}).",
        test_server
    );
    Ok(())
}
