//! Defines the custom error types for the email-verifier application.

use std::io;
use thiserror::Error;

/// The primary error type for the verification process.
///
/// None of these ever escape [`crate::EmailVerifier::validate`] or the batch
/// event stream; they are folded into result fields at the pipeline boundary.
#[derive(Error, Debug)]
pub enum AppError {
    /// Error occurring during configuration loading or validation.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// Error initializing necessary components (e.g., resolvers, TLS config).
    #[error("Initialization Error: {0}")]
    Initialization(String),

    /// Error related to file or socket input/output operations.
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// Error during JSON serialization or deserialization.
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error reading CSV input.
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),

    /// Error during DNS resolution.
    #[error("DNS Resolution Error: {0}")]
    Dns(#[from] trust_dns_resolver::error::ResolveError),

    /// Specific DNS error indicating no relevant records were found.
    #[error("No DNS Records Found: {0}")]
    NoDnsRecords(String),

    /// The server answered with something the client could not use.
    #[error("SMTP Protocol Error: {0}")]
    SmtpProtocol(String),

    /// A connect or per-command deadline elapsed.
    #[error("SMTP Timeout: {0}")]
    SmtpTimeout(String),

    /// Error specifically during the STARTTLS handshake.
    #[error("SMTP STARTTLS Error: {0}")]
    SmtpTls(String),

    /// The peer closed the connection before a reply was complete.
    #[error("Connection closed by remote host")]
    ConnectionClosed,

    /// Error related to concurrency or task execution.
    #[error("Task Execution Error: {0}")]
    Task(String),
}

impl AppError {
    /// True for failures of the connection itself rather than of the dialogue.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AppError::Io(_)
                | AppError::SmtpTimeout(_)
                | AppError::SmtpTls(_)
                | AppError::ConnectionClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
