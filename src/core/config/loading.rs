//! Handles loading configuration from files and applying it to the Config struct.

use super::{Config, ConfigFile};
use anyhow::Context;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Loads configuration settings from a TOML file.
/// Returns the parsed `ConfigFile` content.
pub(crate) fn load_config_file(file_path: &str) -> anyhow::Result<ConfigFile> {
    let path = Path::new(file_path);
    if !path.exists() || !path.is_file() {
        return Err(anyhow::anyhow!(
            "File not found or is not a file: {}",
            file_path
        ));
    }
    tracing::debug!("Attempting to read config file: {}", file_path);
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", file_path))?;

    let config_file_content: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse TOML configuration from {}", file_path))?;

    tracing::debug!("Successfully parsed configuration file: {}", file_path);
    Ok(config_file_content)
}

/// Applies settings from a parsed `ConfigFile` onto a mutable `Config` instance.
/// Used for both file contents and builder overrides.
pub(crate) fn apply_file_config(config: &mut Config, file_config: &ConfigFile) {
    // DNS
    if let Some(timeout) = file_config.dns.dns_timeout {
        config.dns_timeout = Duration::from_secs(timeout);
    }
    if let Some(ref servers) = file_config.dns.dns_servers {
        if !servers.is_empty() {
            config.dns_servers = servers.clone();
        }
    }

    // SMTP
    if let Some(timeout) = file_config.smtp.smtp_timeout {
        config.smtp_timeout = Duration::from_secs(timeout);
    }
    if let Some(timeout) = file_config.smtp.smtp_connect_timeout {
        config.smtp_connect_timeout = Duration::from_secs(timeout);
    }
    if let Some(port) = file_config.smtp.smtp_port {
        config.smtp_port = port;
    }
    if let Some(ref helo) = file_config.smtp.helo_host {
        if !helo.trim().is_empty() {
            config.helo_host = helo.trim().to_string();
        }
    }
    if let Some(ref sender) = file_config.smtp.smtp_sender_email {
        config.smtp_sender_email = sender.trim().to_string();
    }
    if let Some(attempts) = file_config.smtp.max_verification_attempts {
        config.max_verification_attempts = attempts;
    }
    if let Some(backoff) = file_config.smtp.retry_backoff_ms {
        config.retry_backoff = Duration::from_millis(backoff);
    }

    // Batch
    if let Some(size) = file_config.batch.batch_size {
        config.batch_size = size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[dns]\ndns_servers = [\"9.9.9.9\"]\n[smtp]\nsmtp_port = 2525\nretry_backoff_ms = 250"
        )
        .unwrap();

        let parsed = load_config_file(file.path().to_str().unwrap()).unwrap();
        let mut config = Config::default();
        apply_file_config(&mut config, &parsed);

        assert_eq!(config.dns_servers, vec!["9.9.9.9".to_string()]);
        assert_eq!(config.smtp_port, 2525);
        assert_eq!(config.retry_backoff, Duration::from_millis(250));
        assert_eq!(config.smtp_timeout, Duration::from_secs(5));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config_file("/definitely/not/here.toml").is_err());
    }
}
