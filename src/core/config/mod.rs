//! Defines the core runtime `Config` struct, its defaults, and related utilities.
//! Submodules handle loading, building, and validation.

pub(crate) mod builder;
pub(crate) mod file;
pub(crate) mod loading;
pub(crate) mod validation;

pub use builder::ConfigBuilder;
pub use file::ConfigFile;

pub(crate) use crate::core::error::Result;
use std::time::Duration;

/// Runtime configuration settings used by the email-verifier core logic.
#[derive(Clone)]
pub struct Config {
    pub dns_timeout: Duration,
    pub dns_servers: Vec<String>,

    /// Per-command reply deadline for providers without their own policy.
    pub smtp_timeout: Duration,
    pub smtp_connect_timeout: Duration,
    pub smtp_port: u16,
    pub helo_host: String,
    pub smtp_sender_email: String,
    /// Retry budget per MX host for providers without their own policy.
    pub max_verification_attempts: u32,
    pub retry_backoff: Duration,

    pub batch_size: usize,

    pub loaded_config_path: Option<String>,
}

impl Config {
    fn build_default() -> Self {
        Config {
            dns_timeout: Duration::from_secs(5),
            dns_servers: Vec::new(),
            smtp_timeout: Duration::from_secs(5),
            smtp_connect_timeout: Duration::from_secs(5),
            smtp_port: 25,
            helo_host: "mail.example.com".to_string(),
            smtp_sender_email: "verify-probe@example.com".to_string(),
            max_verification_attempts: 2,
            retry_backoff: Duration::from_secs(1),
            batch_size: 5,
            loaded_config_path: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::build_default()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("dns_timeout", &self.dns_timeout)
            .field("dns_servers_count", &self.dns_servers.len())
            .field("smtp_timeout", &self.smtp_timeout)
            .field("smtp_connect_timeout", &self.smtp_connect_timeout)
            .field("smtp_port", &self.smtp_port)
            .field("helo_host", &self.helo_host)
            .field("smtp_sender_email", &self.smtp_sender_email)
            .field("max_verification_attempts", &self.max_verification_attempts)
            .field("retry_backoff", &self.retry_backoff)
            .field("batch_size", &self.batch_size)
            .field("loaded_config_path", &self.loaded_config_path)
            .finish()
    }
}
