//! Contains validation logic for the final Config struct.

use super::{Config, Result};
use crate::core::error::AppError;
use std::net::IpAddr;
use std::time::Duration;

/// Validates the configuration settings after loading and potential overrides.
/// Mutates the config to clamp values where that is unambiguous.
pub(crate) fn validate_config(config: &mut Config) -> Result<()> {
    if config.smtp_timeout.is_zero() {
        tracing::warn!("SMTP command timeout was 0. Setting to 1 second.");
        config.smtp_timeout = Duration::from_secs(1);
    }
    if config.smtp_connect_timeout.is_zero() {
        tracing::warn!("SMTP connect timeout was 0. Setting to 1 second.");
        config.smtp_connect_timeout = Duration::from_secs(1);
    }
    if config.dns_timeout.is_zero() {
        tracing::warn!("DNS timeout was 0. Setting to 1 second.");
        config.dns_timeout = Duration::from_secs(1);
    }
    if config.smtp_port == 0 {
        return Err(AppError::Config("SMTP port cannot be 0.".to_string()));
    }
    if config.max_verification_attempts == 0 {
        tracing::warn!("Max verification attempts was set to 0. Setting to 1.");
        config.max_verification_attempts = 1;
    }
    if config.batch_size == 0 {
        tracing::warn!("Batch size was set to 0. Setting to 1.");
        config.batch_size = 1;
    }
    if config.helo_host.trim().is_empty() {
        return Err(AppError::Config("HELO host cannot be empty.".to_string()));
    }
    if !config.smtp_sender_email.contains('@') || !config.smtp_sender_email.contains('.') {
        return Err(AppError::Config(format!(
            "Invalid SMTP sender email format: {}",
            config.smtp_sender_email
        )));
    }
    for server in &config.dns_servers {
        if server.parse::<IpAddr>().is_err() {
            return Err(AppError::Config(format!(
                "DNS server must be an IP address: {}",
                server
            )));
        }
    }
    Ok(())
}
