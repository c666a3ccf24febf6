//! # Email Verifier Core Library
//!
//! This crate checks whether email addresses are deliverable without sending
//! mail: address syntax, DNS existence, MX and SPF records, then a live SMTP
//! handshake that stops at `RCPT TO` against the domain's mail servers.
//!
//! It is designed to be used either directly as a library or via the
//! `email-verifier` command-line tool (which uses this library).

mod core;
mod utils;
mod verification;

pub use crate::core::batch::{email_field, validate_batch, RecordSource, EMAIL_FIELDS};
pub use crate::core::config::{Config, ConfigBuilder, ConfigFile};
pub use crate::core::error::{AppError, Result};
pub use crate::core::models::{
    BatchEvent, BatchRecord, Checks, MxRecord, Record, ValidationDetails, ValidationResult,
};
pub use crate::core::verifier::EmailVerifier;
pub use crate::utils::dns::{DnsResolver, SystemResolver};
pub use crate::utils::input::FileSource;
pub use crate::utils::smtp::{
    Connector, Reply, ReplyParser, SessionState, SmtpOutcome, SmtpSession, TcpConnector,
};
pub use crate::verification::{MailboxProber, PolicyResolver, Provider, ProviderPolicy};

use crate::utils::smtp::test_smtp_connectivity;

/// Builds a production verifier: configured DNS resolver, plain TCP probes.
pub fn initialize_verifier(config: &Config) -> Result<EmailVerifier> {
    EmailVerifier::new(config)
}

/// Performs an early check for SMTP connectivity.
pub async fn check_smtp_connectivity() -> Result<()> {
    test_smtp_connectivity().await
}
