//! Provides the single-connection SMTP session used for mailbox probes.
//!
//! A session only ever goes as far as `RCPT TO`; no message is transferred.

use super::response::{Reply, ReplyParser};
use super::result::SmtpOutcome;
use super::transport::{Connector, Transport};
use crate::core::error::{AppError, Result};
use crate::verification::policy::ProviderPolicy;

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

const READ_CHUNK: usize = 4096;
const FALLBACK_HELO: &str = "localhost";

/// Where a session is in the probe dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Greeted,
    TlsUpgrading,
    SenderAccepted,
    Probed,
    Closed,
    Failed,
}

/// One exclusive connection to one MX host.
pub struct SmtpSession<S> {
    transport: Transport<S>,
    parser: ReplyParser,
    host: String,
    command_timeout: Duration,
    state: SessionState,
    supports_tls: bool,
    helo_identity: Option<String>,
}

impl<S> SmtpSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an already connected stream.
    pub fn new(stream: S, host: &str, command_timeout: Duration) -> Self {
        Self {
            transport: Transport::Plain(stream),
            parser: ReplyParser::new(),
            host: host.to_string(),
            command_timeout,
            state: SessionState::Connected,
            supports_tls: false,
            helo_identity: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn supports_tls(&self) -> bool {
        self.supports_tls
    }

    pub fn is_encrypted(&self) -> bool {
        self.transport.is_tls()
    }

    /// Frames replies out of the stream until one is complete. Unbounded in
    /// time; callers apply the command deadline.
    async fn next_reply(&mut self) -> Result<Reply> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(reply) = self.parser.next_reply() {
                tracing::trace!(target: "smtp_task", "[{}] S: {} {}", self.host, reply.code, reply.message());
                return Ok(reply);
            }
            let n = self.transport.read(&mut chunk).await?;
            self.parser.feed(&chunk[..n])?;
        }
    }

    /// Waits for one complete reply within a single command deadline.
    async fn read_reply(&mut self) -> Result<Reply> {
        let limit = self.command_timeout;
        let result = match timeout(limit, self.next_reply()).await {
            Ok(reply) => reply,
            Err(_) => Err(self.timed_out()),
        };
        result.map_err(|e| self.abandon_on_transport_error(e))
    }

    /// Sends one command line and waits for its complete reply. Writing and
    /// reading share one deadline.
    pub async fn command(&mut self, command: &str) -> Result<Reply> {
        tracing::trace!(target: "smtp_task", "[{}] C: {}", self.host, command);
        let line = format!("{}\r\n", command);
        let limit = self.command_timeout;
        let exchange = async {
            self.transport.write_all(line.as_bytes()).await?;
            self.next_reply().await
        };
        let result = match timeout(limit, exchange).await {
            Ok(reply) => reply,
            Err(_) => Err(self.timed_out()),
        };
        result.map_err(|e| self.abandon_on_transport_error(e))
    }

    fn timed_out(&self) -> AppError {
        AppError::SmtpTimeout(format!(
            "No reply from {} within {:?}",
            self.host, self.command_timeout
        ))
    }

    /// A dead or late connection is dropped on the spot; nothing more is
    /// written to it, not even `QUIT`.
    fn abandon_on_transport_error(&mut self, e: AppError) -> AppError {
        if e.is_transport() && !matches!(self.transport, Transport::Closed) {
            tracing::debug!(target: "smtp_task", "[{}] Dropping connection: {}", self.host, e);
            self.transport = Transport::Closed;
        }
        e
    }

    /// Reads the banner; anything other than 220 is fatal.
    pub async fn greet(&mut self) -> Result<Reply> {
        let reply = self.read_reply().await?;
        if reply.code != 220 {
            return Err(AppError::SmtpProtocol(format!(
                "Invalid server greeting: {} {}",
                reply.code,
                reply.message()
            )));
        }
        self.state = SessionState::Greeted;
        Ok(reply)
    }

    /// Tries EHLO then HELO for each identity; the first 250 wins.
    pub async fn hello(&mut self, identities: &[String]) -> Result<Reply> {
        for identity in identities {
            for verb in ["EHLO", "HELO"] {
                let reply = self.command(&format!("{} {}", verb, identity)).await?;
                if reply.code == 250 {
                    tracing::debug!(target: "smtp_task", "[{}] {} accepted as '{}'", self.host, verb, identity);
                    self.helo_identity = Some(identity.clone());
                    return Ok(reply);
                }
                tracing::debug!(target: "smtp_task",
                    "[{}] {} {} rejected: {} {}", self.host, verb, identity, reply.code, reply.message());
            }
        }
        Err(AppError::SmtpProtocol("HELO/EHLO failed".to_string()))
    }

    /// Upgrades to TLS when advertised. Returns whether the channel is now encrypted.
    ///
    /// A refused `STARTTLS` leaves the plaintext channel usable; a failed
    /// handshake does not.
    pub async fn starttls(&mut self, ehlo: &Reply, require_tls: bool) -> Result<bool> {
        self.supports_tls = ehlo.advertises("STARTTLS");
        if !self.supports_tls {
            if require_tls {
                return Err(AppError::SmtpTls(
                    "Required TLS connection failed: STARTTLS not advertised".to_string(),
                ));
            }
            return Ok(false);
        }

        self.state = SessionState::TlsUpgrading;
        let reply = self.command("STARTTLS").await?;
        if reply.code != 220 {
            tracing::debug!(target: "smtp_task",
                "[{}] STARTTLS refused: {} {}", self.host, reply.code, reply.message());
            if require_tls {
                return Err(AppError::SmtpTls(format!(
                    "Required TLS connection failed: {} {}",
                    reply.code,
                    reply.message()
                )));
            }
            self.state = SessionState::Greeted;
            return Ok(false);
        }

        self.parser.clear();
        if let Err(e) = self.transport.upgrade(&self.host).await {
            if require_tls {
                return Err(AppError::SmtpTls(format!("Required TLS connection failed: {}", e)));
            }
            return Err(e);
        }
        tracing::debug!(target: "smtp_task", "[{}] Connection upgraded to TLS", self.host);

        let identity = self
            .helo_identity
            .clone()
            .unwrap_or_else(|| FALLBACK_HELO.to_string());
        let reply = self.command(&format!("EHLO {}", identity)).await?;
        if reply.code != 250 {
            self.hello(&[identity]).await?;
        }
        self.state = SessionState::Greeted;
        Ok(true)
    }

    /// Issues `MAIL FROM` for each candidate until one is accepted.
    pub async fn mail_from(&mut self, senders: &[String]) -> Result<String> {
        for sender in senders {
            let reply = self.command(&format!("MAIL FROM:<{}>", sender)).await?;
            if reply.code == 250 {
                self.state = SessionState::SenderAccepted;
                return Ok(sender.clone());
            }
            tracing::debug!(target: "smtp_task",
                "[{}] MAIL FROM:<{}> rejected: {} {}", self.host, sender, reply.code, reply.message());
        }
        Err(AppError::SmtpProtocol("MAIL FROM command failed".to_string()))
    }

    /// Issues `RCPT TO` for the target. The raw reply is the verdict signal.
    pub async fn rcpt_to(&mut self, address: &str) -> Result<Reply> {
        let reply = self.command(&format!("RCPT TO:<{}>", address)).await?;
        self.state = SessionState::Probed;
        Ok(reply)
    }

    /// Best-effort `QUIT` and close. Never fails. A connection already
    /// dropped after a transport failure is left alone.
    pub async fn close(&mut self) {
        if !matches!(self.transport, Transport::Closed) {
            if let Err(e) = self.command("QUIT").await {
                tracing::trace!(target: "smtp_task", "[{}] Ignoring QUIT error: {}", self.host, e);
            }
        }
        self.transport.shutdown().await;
        self.state = SessionState::Closed;
    }
}

/// Identities tried for EHLO/HELO, most plausible first.
pub fn helo_candidates(policy: &ProviderPolicy, domain: &str, mx_host: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    for candidate in [policy.helo_host.as_str(), domain, mx_host, FALLBACK_HELO] {
        let candidate = candidate.trim().trim_end_matches('.');
        if !candidate.is_empty() && !candidates.iter().any(|c| c.eq_ignore_ascii_case(candidate)) {
            candidates.push(candidate.to_string());
        }
    }
    candidates
}

/// Sender addresses tried for `MAIL FROM`, policy addresses first.
pub fn sender_candidates(policy: &ProviderPolicy, domain: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    let generic = ["verify", "postmaster", "check"].map(|local| format!("{}@{}", local, domain));
    for candidate in policy.from_addresses.iter().chain(generic.iter()) {
        if !candidates.iter().any(|c| c.eq_ignore_ascii_case(candidate)) {
            candidates.push(candidate.clone());
        }
    }
    candidates
}

/// Runs one complete probe attempt against `mx_host`.
///
/// Always ends with the session closed. An aborted attempt comes back with
/// `success == false`; an answered `RCPT TO` is successful whatever its code.
pub async fn probe_once<C: Connector>(
    connector: &C,
    mx_host: &str,
    port: u16,
    address: &str,
    domain: &str,
    policy: &ProviderPolicy,
) -> SmtpOutcome {
    tracing::debug!(target: "smtp_task", "Connecting to {}:{} for <{}>", mx_host, port, address);
    let stream = match timeout(policy.connect_timeout, connector.connect(mx_host, port)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return SmtpOutcome::aborted(format!("Connection to {} failed: {}", mx_host, e), false)
        }
        Err(_) => {
            return SmtpOutcome::aborted(format!("Connection to {} timed out", mx_host), false)
        }
    };

    let mut session = SmtpSession::new(stream, mx_host, policy.timeout);
    let result = run_dialogue(&mut session, address, domain, mx_host, policy).await;
    if let Err(ref e) = result {
        let kind = if e.is_transport() { "transport" } else { "protocol" };
        tracing::debug!(target: "smtp_task", "[{}] Probe aborted in state {:?} ({} failure): {}", mx_host, session.state, kind, e);
        session.state = SessionState::Failed;
    }
    session.close().await;

    let supports_tls = session.supports_tls();
    match result {
        Ok(reply) => SmtpOutcome::answered(reply.code, reply.message(), supports_tls),
        Err(e) => SmtpOutcome::aborted(e.to_string(), supports_tls),
    }
}

async fn run_dialogue<S>(
    session: &mut SmtpSession<S>,
    address: &str,
    domain: &str,
    mx_host: &str,
    policy: &ProviderPolicy,
) -> Result<Reply>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    session.greet().await?;
    let ehlo = session.hello(&helo_candidates(policy, domain, mx_host)).await?;
    session.starttls(&ehlo, policy.require_tls).await?;
    session.mail_from(&sender_candidates(policy, domain)).await?;
    session.rcpt_to(address).await
}
